//! Topic guard — keeps the assistant on classical music.
//!
//! The user's words are classified by the advisor model before anything
//! else sees them. A banned topic ends the turn with a fixed refusal. If
//! the model cannot classify after every retry, the turn goes ahead.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, keys};
use crate::extract::{BasisExtractor, default_extractor};
use crate::model::AdvisorModel;
use crate::prompts;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::Utc;
use maestro_config::{TopicGuardConfig, default_refusal};
use maestro_core::error::ProviderError;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::topic::Topic;
use maestro_core::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct TopicClassification {
    topic: String,
}

/// Refuses turns whose topic is in the banned set.
pub struct TopicGuardAdvisor {
    model: AdvisorModel,
    banned: HashSet<Topic>,
    refusal: String,
    retry: RetryPolicy,
    extractor: BasisExtractor,
    events: Option<Arc<EventBus>>,
    order: i32,
}

impl TopicGuardAdvisor {
    pub const DEFAULT_ORDER: i32 = -50;

    pub fn new(model: AdvisorModel, banned: impl IntoIterator<Item = Topic>) -> Self {
        Self {
            model,
            banned: banned.into_iter().collect(),
            refusal: default_refusal(),
            retry: RetryPolicy::default(),
            extractor: default_extractor(),
            events: None,
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn from_config(model: AdvisorModel, config: &TopicGuardConfig) -> Self {
        Self::new(model, config.banned_topics.iter().copied()).with_refusal(config.refusal_message.clone())
    }

    pub fn with_refusal(mut self, refusal: impl Into<String>) -> Self {
        self.refusal = refusal.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_extractor(mut self, extractor: BasisExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn is_banned(&self, topic: Topic) -> bool {
        self.banned.contains(&topic)
    }

    async fn classify(&self, content: &str) -> Result<Topic> {
        let classification: TopicClassification = self
            .model
            .ask("", &prompts::topic_guard(content), prompts::topic_schema())
            .await?;
        let topic = classification
            .topic
            .parse::<Topic>()
            .map_err(ProviderError::MalformedOutput)?;
        Ok(topic)
    }
}

#[async_trait]
impl Advisor for TopicGuardAdvisor {
    fn name(&self) -> &str {
        "topic_guard"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let content = (self.extractor)(&request);
        if content.trim().is_empty() || self.banned.is_empty() {
            return next.run(request).await;
        }

        let classified = {
            let content = content.as_str();
            self.retry.execute("topic_guard", move || self.classify(content)).await
        };

        let topic = match classified {
            Ok(topic) => topic,
            Err(e) => {
                error!(error = %e, "Model kept failing to classify topic, letting the turn through");
                return next.run(request).await;
            }
        };

        info!(%topic, content = %content, "User content classified");
        let request = request.with_context(keys::TOPIC, topic.as_str());

        if !self.is_banned(topic) {
            return next.run(request).await;
        }

        if let Some(events) = &self.events {
            events.publish(DomainEvent::TopicBlocked {
                conversation_id: request.conversation_id().to_string(),
                topic,
                timestamp: Utc::now(),
            });
        }
        Ok(AdvisedResponse::canned(self.refusal.as_str(), &request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::AdvisorChain;
    use crate::test_helpers::{EchoTerminal, ScriptedProvider};
    use maestro_core::message::ConversationId;

    const REFUSAL: &str = "I'm sorry, but I can only help you with Classical music.";

    struct Fixture {
        chain: AdvisorChain,
        terminal: Arc<EchoTerminal>,
        provider: Arc<ScriptedProvider>,
    }

    fn fixture(provider: ScriptedProvider, banned: &[Topic]) -> Fixture {
        let provider = Arc::new(provider);
        let terminal = Arc::new(EchoTerminal::default());
        let guard = TopicGuardAdvisor::new(AdvisorModel::new(provider.clone(), "gemma2:2b"), banned.iter().copied());
        Fixture {
            chain: AdvisorChain::new(vec![Arc::new(guard)], terminal.clone()),
            terminal,
            provider,
        }
    }

    fn request(text: &str) -> AdvisedRequest {
        AdvisedRequest::new(ConversationId::from("c"), text)
    }

    #[tokio::test]
    async fn banned_topic_is_refused_without_model_call() {
        let f = fixture(ScriptedProvider::text(r#"{"topic": "SPORT"}"#), &[Topic::Sport, Topic::Politics]);

        let response = f.chain.call(request("Who won the cup final?")).await.unwrap();

        assert_eq!(response.text(), Some(REFUSAL));
        assert_eq!(response.context()[keys::TOPIC], "SPORT");
        assert_eq!(f.terminal.calls(), 0);
    }

    #[tokio::test]
    async fn every_banned_configuration_refuses() {
        for banned in Topic::ALL {
            let reply = format!(r#"{{"topic": "{}"}}"#, banned.as_str());
            let f = fixture(ScriptedProvider::text(&reply), &[banned]);
            let response = f.chain.call(request("anything")).await.unwrap();
            assert_eq!(response.text(), Some(REFUSAL), "banned {banned}");
            assert_eq!(f.terminal.calls(), 0);
        }
    }

    #[tokio::test]
    async fn allowed_topic_continues() {
        let f = fixture(ScriptedProvider::text(r#"{"topic": "OTHER"}"#), &[Topic::Sport]);

        let response = f.chain.call(request("Tell me about Brahms")).await.unwrap();

        assert_eq!(response.text(), Some("echo: Tell me about Brahms"));
        assert_eq!(f.terminal.last_request().unwrap().context()[keys::TOPIC], "OTHER");
    }

    #[tokio::test]
    async fn topic_name_is_case_insensitive() {
        let f = fixture(ScriptedProvider::text(r#"{"topic": "religion"}"#), &[Topic::Religion]);
        let response = f.chain.call(request("Is there a god?")).await.unwrap();
        assert_eq!(response.text(), Some(REFUSAL));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_classification_fails_open() {
        let f = fixture(ScriptedProvider::failing(), &[Topic::Sport]);

        let response = f.chain.call(request("Who won the cup final?")).await.unwrap();

        assert_eq!(response.text(), Some("echo: Who won the cup final?"));
        assert_eq!(f.provider.calls(), 3);
        assert_eq!(f.terminal.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_topic_is_retried() {
        let f = fixture(
            ScriptedProvider::texts(&[r#"{"topic": "FOOTBALL"}"#, r#"{"topic": "SPORT"}"#]),
            &[Topic::Sport],
        );
        let response = f.chain.call(request("Who won the cup final?")).await.unwrap();
        assert_eq!(response.text(), Some(REFUSAL));
        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test]
    async fn replaying_a_refused_request_refuses_again() {
        let f = fixture(ScriptedProvider::text(r#"{"topic": "POLITICS"}"#), &[Topic::Politics]);
        let req = request("Who should I vote for?");

        let first = f.chain.call(req.clone()).await.unwrap();
        let second = f.chain.call(req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.terminal.calls(), 0);
    }

    #[tokio::test]
    async fn classifies_users_words_only() {
        let f = fixture(ScriptedProvider::text(r#"{"topic": "OTHER"}"#), &[Topic::Sport]);
        f.chain
            .call(request("Who was Mahler?\n\nRelated notes:\n---\nfootball scores"))
            .await
            .unwrap();
        let prompt = &f.provider.requests()[0].messages[0].content;
        assert!(prompt.contains("Who was Mahler?"));
        assert!(!prompt.contains("football"));
    }

    #[test]
    fn config_sets_banned_topics_and_refusal() {
        let config = TopicGuardConfig {
            enabled: true,
            banned_topics: vec![Topic::Religion],
            refusal_message: "Let's talk about music instead.".into(),
        };
        let guard = TopicGuardAdvisor::from_config(
            AdvisorModel::new(Arc::new(ScriptedProvider::text("{}")), "m"),
            &config,
        );
        assert!(guard.is_banned(Topic::Religion));
        assert!(!guard.is_banned(Topic::Sport));
        assert_eq!(guard.refusal, "Let's talk about music instead.");
    }
}
