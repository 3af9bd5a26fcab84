//! The chain's terminal step — one exchange with the primary model.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Generation, Terminal};
use async_trait::async_trait;
use maestro_config::ModelConfig;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::message::Message;
use maestro_core::provider::{Provider, ProviderRequest, Usage};
use maestro_core::tool::{ToolCall, ToolRegistry};
use maestro_core::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Calls the primary model, running any tools it asks for.
///
/// Tool calls are executed and fed back until the model answers in text,
/// for at most `max_tool_rounds` rounds.
pub struct PrimaryModel {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    events: Option<Arc<EventBus>>,
    max_tool_rounds: u32,
}

impl PrimaryModel {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools: Arc::new(ToolRegistry::new()),
            events: None,
            max_tool_rounds: 5,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::new(provider, config.model.as_str())
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    async fn run_tools(&self, calls: &[maestro_core::message::MessageToolCall], messages: &mut Vec<Message>) {
        for tc in calls {
            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
            };

            match self.tools.execute(&call).await {
                Ok(result) => {
                    debug!(tool = %tc.name, success = result.success, "Tool executed");
                    messages.push(Message::tool_result(&tc.id, result.output));
                }
                Err(e) => {
                    warn!(tool = %tc.name, error = %e, "Tool execution failed");
                    messages.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                }
            }
        }
    }
}

fn add_usage(total: &mut Option<Usage>, usage: Option<Usage>) {
    let Some(usage) = usage else { return };
    match total {
        Some(t) => {
            t.prompt_tokens += usage.prompt_tokens;
            t.completion_tokens += usage.completion_tokens;
            t.total_tokens += usage.total_tokens;
        }
        None => *total = Some(usage),
    }
}

#[async_trait]
impl Terminal for PrimaryModel {
    async fn respond(&self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        let mut messages = request.messages();
        let definitions = self.tools.definitions();
        let mut usage = None;
        let mut round = 0;

        let (content, model) = loop {
            round += 1;

            let mut provider_request = ProviderRequest::new(self.model.as_str(), messages.clone())
                .with_temperature(self.temperature);
            provider_request.max_tokens = self.max_tokens;
            if round <= self.max_tool_rounds {
                provider_request.tools = definitions.clone();
            }

            let response = self.provider.complete(provider_request).await?;
            add_usage(&mut usage, response.usage);

            if response.message.tool_calls.is_empty() || round > self.max_tool_rounds {
                break (response.message.content, response.model);
            }

            debug!(
                conversation_id = %request.conversation_id(),
                round,
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );
            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            self.run_tools(&calls, &mut messages).await;
        };

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ResponseGenerated {
                conversation_id: request.conversation_id().to_string(),
                model: model.clone(),
                tokens_used: usage.as_ref().map_or(0, |u| u.total_tokens),
                timestamp: chrono::Utc::now(),
            });
        }

        let generation = Generation {
            content,
            model: Some(model),
            usage,
        };
        Ok(AdvisedResponse::new(vec![generation], request.context().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, make_text_response, make_tool_call, make_tool_call_response};
    use maestro_core::catalog::{Mention, MentionType};
    use maestro_core::error::{Error, ProviderError};
    use maestro_core::message::{ConversationId, Role};
    use maestro_core::record::RecordStore;
    use maestro_memory::InMemoryRecordStore;

    fn request(text: &str) -> AdvisedRequest {
        AdvisedRequest::new(ConversationId::from("c"), text).with_system_prompt("be helpful")
    }

    #[tokio::test]
    async fn plain_answer() {
        let provider = Arc::new(ScriptedProvider::text("Brahms wrote four symphonies."));
        let primary = PrimaryModel::new(provider.clone(), "primary");

        let response = primary.respond(request("How many symphonies?")).await.unwrap();

        assert_eq!(response.text(), Some("Brahms wrote four symphonies."));
        assert_eq!(response.generations()[0].usage.as_ref().unwrap().total_tokens, 15);
        let sent = &provider.requests()[0];
        assert_eq!(sent.messages[0].role, Role::System);
        assert_eq!(sent.messages.last().unwrap().content, "How many symphonies?");
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let store = Arc::new(InMemoryRecordStore::<Mention>::new());
        store.save(Mention { count: 7, ..Mention::new("Bach", MentionType::Composer) }).await.unwrap();
        let tools = Arc::new(maestro_tools::default_registry(store));

        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(make_tool_call_response(vec![make_tool_call(
                "list_popular_things",
                serde_json::json!({"type": "Composer"}),
            )])),
            Ok(make_text_response("Bach is the favourite.")),
        ]));
        let primary = PrimaryModel::new(provider.clone(), "primary").with_tools(tools);

        let response = primary.respond(request("Who is popular?")).await.unwrap();

        assert_eq!(response.text(), Some("Bach is the favourite."));
        let second = &provider.requests()[1];
        let tool_message = second.messages.last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.content.contains("Bach"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(make_tool_call_response(vec![make_tool_call("nope", serde_json::json!({}))])),
            Ok(make_text_response("done")),
        ]));
        let primary = PrimaryModel::new(provider.clone(), "primary");

        primary.respond(request("hi")).await.unwrap();

        let second = &provider.requests()[1];
        assert!(second.messages.last().unwrap().content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(make_tool_call_response(vec![
            make_tool_call("nope", serde_json::json!({})),
        ]))]));
        let primary = PrimaryModel::new(provider.clone(), "primary").with_max_tool_rounds(2);

        primary.respond(request("loop forever")).await.unwrap();

        assert_eq!(provider.calls(), 3);
        assert!(provider.requests()[2].tools.is_empty());
    }

    #[tokio::test]
    async fn primary_failure_propagates() {
        let primary = PrimaryModel::new(Arc::new(ScriptedProvider::failing()), "primary");

        let err = primary.respond(request("hi")).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn publishes_response_generated() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let primary = PrimaryModel::new(Arc::new(ScriptedProvider::text("ok")), "primary").with_events(events);

        primary.respond(request("hi")).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(&*event, DomainEvent::ResponseGenerated { tokens_used: 15, .. }));
    }
}
