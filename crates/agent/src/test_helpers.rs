//! Shared test doubles for advisor tests.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Generation, Terminal};
use async_trait::async_trait;
use maestro_core::error::ProviderError;
use maestro_core::message::{Message, MessageToolCall};
use maestro_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A provider that plays back scripted replies.
///
/// Each call takes the next reply; the last one repeats once the script
/// runs out. An optional delay simulates a slow model.
pub struct ScriptedProvider {
    script: Vec<Result<ProviderResponse, ProviderError>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one reply");
        Self {
            script,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`.
    pub fn text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    /// Answers each text in turn.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    /// Always fails with a network error.
    pub fn failing() -> Self {
        Self::new(vec![Err(ProviderError::Network("connection refused".into()))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            (requests.len() - 1).min(self.script.len() - 1)
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script[index].clone()
    }
}

/// An advisor model that answers by requested schema name.
///
/// Lets one provider stand in for topic classification, memory capture and
/// performance extraction at once.
pub struct SchemaProvider {
    replies: HashMap<&'static str, Result<String, ProviderError>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl SchemaProvider {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn reply(mut self, schema: &'static str, json: &str) -> Self {
        self.replies.insert(schema, Ok(json.to_string()));
        self
    }

    pub fn fail(mut self, schema: &'static str) -> Self {
        self.replies
            .insert(schema, Err(ProviderError::Network("model unavailable".into())));
        self
    }

    pub fn calls_for(&self, schema: &str) -> usize {
        self.calls.lock().unwrap().get(schema).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Provider for SchemaProvider {
    fn name(&self) -> &str {
        "schema"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let schema = request
            .response_format
            .as_ref()
            .map(|f| f.name.clone())
            .unwrap_or_default();
        *self.calls.lock().unwrap().entry(schema.clone()).or_default() += 1;

        match self.replies.get(schema.as_str()) {
            Some(Ok(json)) => Ok(make_text_response(json)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ProviderError::MalformedOutput(format!("no reply scripted for '{schema}'"))),
        }
    }
}

/// Replies `echo: <user text>` and counts calls.
#[derive(Default)]
pub struct EchoTerminal {
    calls: AtomicUsize,
    last: Mutex<Option<AdvisedRequest>>,
}

impl EchoTerminal {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AdvisedRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Terminal for EchoTerminal {
    async fn respond(&self, request: AdvisedRequest) -> maestro_core::Result<AdvisedResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let generation = Generation {
            content: format!("echo: {}", request.user_text()),
            model: Some("echo".into()),
            usage: None,
        };
        let context = request.context().clone();
        *self.last.lock().unwrap() = Some(request);
        Ok(AdvisedResponse::new(vec![generation], context))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response that asks for tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
