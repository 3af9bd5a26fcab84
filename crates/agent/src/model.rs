//! Structured side-calls to the advisor model.

use maestro_config::ModelConfig;
use maestro_core::error::ProviderError;
use maestro_core::message::Message;
use maestro_core::provider::{Provider, ProviderRequest, ResponseFormat};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A model used by advisors for classification and extraction.
///
/// Usually a cheaper model than the primary one.
#[derive(Clone)]
pub struct AdvisorModel {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl AdvisorModel {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ModelConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a `T`, described to the model by `format`.
    ///
    /// `system` is omitted when empty. A reply that does not decode as `T`
    /// is [`ProviderError::MalformedOutput`].
    pub async fn ask<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
        format: ResponseFormat,
    ) -> Result<T, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(user));

        let request = ProviderRequest::new(self.model.as_str(), messages)
            .with_temperature(self.temperature)
            .with_response_format(format);

        self.provider.complete(request).await?.entity()
    }
}

impl std::fmt::Debug for AdvisorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        useful: bool,
    }

    #[tokio::test]
    async fn sends_schema_and_decodes() {
        let provider = Arc::new(ScriptedProvider::text(r#"{"useful": true}"#));
        let model = AdvisorModel::new(provider.clone(), "gemma2:2b");

        let verdict: Verdict = model
            .ask("Decide", "I play the cello", ResponseFormat::new("verdict", serde_json::json!({})))
            .await
            .unwrap();

        assert!(verdict.useful);
        let sent = provider.requests();
        assert_eq!(sent[0].model, "gemma2:2b");
        assert_eq!(sent[0].messages.len(), 2);
        assert_eq!(sent[0].response_format.as_ref().unwrap().name, "verdict");
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let model = AdvisorModel::new(Arc::new(ScriptedProvider::text("Sure! It is useful.")), "m");
        let err = model
            .ask::<Verdict>("", "x", ResponseFormat::new("verdict", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput(_)));
    }
}
