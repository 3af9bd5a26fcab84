//! Provider trait — the Model capability.
//!
//! A Provider knows how to send a conversation to a language model and get
//! a reply back. The same contract serves the primary user-facing reply and
//! every advisor's independent classification or extraction call, so an
//! advisor can be handed a different (cheaper) provider than the primary one.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "gemma2:2b")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Requested output schema, when the caller wants a structured entity back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A plain request with default sampling settings.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            response_format: None,
        }
    }

    /// Ask the model to answer with JSON matching `format`.
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A JSON schema the reply must conform to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Schema name, sent to providers that require one
    pub name: String,

    /// JSON Schema of the expected entity
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// Decode the reply content as a structured entity.
    ///
    /// Small local models often wrap JSON in a Markdown fence; the fence is
    /// tolerated. Anything else that fails to decode is
    /// [`ProviderError::MalformedOutput`], which callers treat as transient.
    pub fn entity<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        parse_structured(&self.message.content)
    }
}

/// Decode `content` as JSON, stripping an optional ```json fence.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, ProviderError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedOutput(format!("{e}: {}", preview(body)))
    })
}

fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(80).collect();
    if s.chars().count() > 80 {
        out.push('…');
    }
    out
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "nomic-embed-text").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,
}

/// The Model capability.
///
/// Every LLM backend implements this trait. Callers do not know which
/// backend answers, so the primary reply and advisor side-calls can be
/// routed to different models purely by wiring.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            format!("Provider '{}' does not support embeddings", self.name()),
        ))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Classification {
        topic: String,
    }

    #[test]
    fn provider_request_defaults() {
        let req = ProviderRequest::new("gemma2:2b", vec![Message::user("hi")]);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.response_format.is_none());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn parses_plain_json() {
        let c: Classification = parse_structured(r#"{"topic":"SPORT"}"#).unwrap();
        assert_eq!(c.topic, "SPORT");
    }

    #[test]
    fn parses_fenced_json() {
        let c: Classification = parse_structured("```json\n{\"topic\": \"OTHER\"}\n```").unwrap();
        assert_eq!(c.topic, "OTHER");
    }

    #[test]
    fn prose_is_malformed_output() {
        let err = parse_structured::<Classification>("I think this is about sport.").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput(_)));
    }

    #[test]
    fn response_format_serializes_schema() {
        let req = ProviderRequest::new("m", vec![]).with_response_format(ResponseFormat::new(
            "topic",
            serde_json::json!({"type": "object"}),
        ));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("response_format"));
        assert!(json.contains("\"topic\""));
    }
}
