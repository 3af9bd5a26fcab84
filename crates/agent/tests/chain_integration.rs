//! End-to-end tests for the chat orchestrator.
//!
//! These drive whole user turns through the default chain with in-memory
//! stores, a scripted primary model and a scripted advisor model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use maestro_agent::{ChatOrchestrator, Components, ConversationSession, keys};
use maestro_config::AppConfig;
use maestro_core::catalog::{Mention, MentionType, Performance};
use maestro_core::error::ProviderError;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::memory::MemoryBackend;
use maestro_core::message::{ConversationId, Message, Role};
use maestro_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use maestro_core::record::RecordStore;
use maestro_memory::{
    InMemoryBackend, InMemoryChatMemory, InMemoryRecordStore, VectorMemory, default_documents, seed_documents,
    seed_mentions,
};

// ── Mock Providers ───────────────────────────────────────────────────────

/// The user-facing model: always gives the same answer, records requests.
struct PrimaryProvider {
    answer: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl PrimaryProvider {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().expect("primary was never called")
    }
}

#[async_trait::async_trait]
impl Provider for PrimaryProvider {
    fn name(&self) -> &str {
        "e2e_primary"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(text_response(&self.answer))
    }
}

/// The advisor model: answers per requested output schema.
///
/// Embeds text as counts of a few fixed words, so related texts land close.
#[derive(Default)]
struct AdvisorProvider {
    replies: HashMap<&'static str, &'static str>,
    /// Overrides `replies` when the prompt contains the needle.
    matching: Vec<(&'static str, &'static str, &'static str)>,
    delays: HashMap<&'static str, Duration>,
}

const EMBEDDING_AXES: [&str; 4] = ["concert", "applaud", "theme", "string"];

impl AdvisorProvider {
    /// Nothing banned, nothing worth remembering, no performance.
    fn quiet() -> Self {
        Self {
            replies: HashMap::from([
                ("topic_classification", r#"{"topic": "OTHER"}"#),
                ("memory_capture", r#"{"useful": false, "content": null}"#),
                ("performance_extraction", r#"{"work": null, "composer": null, "date": null}"#),
            ]),
            ..Self::default()
        }
    }

    fn with(mut self, schema: &'static str, json: &'static str) -> Self {
        self.replies.insert(schema, json);
        self
    }

    fn with_when(mut self, schema: &'static str, needle: &'static str, json: &'static str) -> Self {
        self.matching.push((schema, needle, json));
        self
    }

    fn slow(mut self, schema: &'static str, delay: Duration) -> Self {
        self.delays.insert(schema, delay);
        self
    }
}

#[async_trait::async_trait]
impl Provider for AdvisorProvider {
    fn name(&self) -> &str {
        "e2e_advisor"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let schema = request.response_format.map(|f| f.name).unwrap_or_default();
        if let Some(delay) = self.delays.get(schema.as_str()) {
            tokio::time::sleep(*delay).await;
        }

        let prompt: String = request.messages.iter().map(|m| m.content.as_str()).collect();
        let matched = self
            .matching
            .iter()
            .find(|(s, needle, _)| *s == schema && prompt.contains(needle))
            .map(|(_, _, json)| json);
        match matched.or_else(|| self.replies.get(schema.as_str())) {
            Some(json) => Ok(text_response(json)),
            None => Err(ProviderError::Network(format!("no reply for {schema}"))),
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let embeddings = request
            .inputs
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                EMBEDDING_AXES.iter().map(|axis| text.matches(axis).count() as f32).collect()
            })
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
        })
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "e2e-model".into(),
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Fixture {
    orchestrator: ChatOrchestrator,
    primary: Arc<PrimaryProvider>,
    mentions: Arc<InMemoryRecordStore<Mention>>,
    performances: Arc<InMemoryRecordStore<Performance>>,
    notes: Arc<dyn MemoryBackend>,
    events: Arc<EventBus>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.backoff_ms = 1;
    config
}

async fn fixture(advisor: AdvisorProvider) -> Fixture {
    fixture_with(test_config(), Arc::new(advisor), Arc::new(InMemoryBackend::new())).await
}

async fn fixture_with(config: AppConfig, advisor: Arc<AdvisorProvider>, notes: Arc<dyn MemoryBackend>) -> Fixture {
    let primary = Arc::new(PrimaryProvider::new("Brahms wrote four symphonies."));
    let mentions = Arc::new(InMemoryRecordStore::<Mention>::new());
    seed_mentions(mentions.as_ref()).await.unwrap();
    let performances = Arc::new(InMemoryRecordStore::<Performance>::new());
    let events = Arc::new(EventBus::default());

    let orchestrator = ChatOrchestrator::from_config(
        &config,
        Components {
            primary: primary.clone(),
            advisor,
            mentions: mentions.clone(),
            performances: performances.clone(),
            notes: notes.clone(),
            chat_memory: Arc::new(InMemoryChatMemory::new().with_max_messages(config.chat_memory.retrieve_size)),
            events: events.clone(),
            tools: Arc::new(maestro_tools::default_registry(mentions.clone())),
        },
    );

    Fixture {
        orchestrator,
        primary,
        mentions,
        performances,
        notes,
        events,
    }
}

fn session() -> ConversationSession {
    ConversationSession::new(ConversationId::from("serene_brahms"))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pass_through_returns_primary_answer_and_counts_mentions() {
    let f = fixture(AdvisorProvider::quiet()).await;

    let response = f
        .orchestrator
        .respond(&session(), "I love Brahms and piano music")
        .await
        .unwrap();
    f.orchestrator.shutdown().await;

    assert_eq!(response.text(), Some("Brahms wrote four symphonies."));
    assert_eq!(f.primary.calls(), 1);
    assert_eq!(f.mentions.find_by_id("Brahms").await.unwrap().unwrap().count, 1);
    assert_eq!(f.mentions.find_by_id("Piano").await.unwrap().unwrap().count, 1);
    assert_eq!(f.mentions.find_by_id("Mozart").await.unwrap().unwrap().count, 0);
    assert_eq!(response.context()[keys::TOPIC], "OTHER");
    assert_eq!(f.notes.count().await.unwrap(), 0);
    assert!(f.performances.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn banned_topic_is_refused_without_calling_primary() {
    let f = fixture(AdvisorProvider::quiet().with("topic_classification", r#"{"topic": "SPORT"}"#)).await;

    let response = f.orchestrator.respond(&session(), "Who won the cup final?").await.unwrap();

    assert_eq!(response.text(), Some(maestro_config::default_refusal().as_str()));
    assert_eq!(f.primary.calls(), 0);
}

#[tokio::test]
async fn announced_performance_is_saved_and_acknowledged() {
    let f = fixture(AdvisorProvider::quiet().with(
        "performance_extraction",
        r#"{"work": "Beethoven 9", "composer": "Berlin Phil", "date": "2025-01-01"}"#,
    ))
    .await;

    let response = f
        .orchestrator
        .respond(&session(), "Record: Beethoven 9 by Berlin Phil on 2025-01-01")
        .await
        .unwrap();

    assert_eq!(
        response.text(),
        Some("Noted! I've saved Beethoven 9 by Berlin Phil on 2025-01-01.")
    );
    assert_eq!(f.primary.calls(), 0);
    let saved = f.performances.find_all().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].work, "Beethoven 9");
    assert_eq!(saved[0].date.to_string(), "2025-01-01");
}

#[tokio::test]
async fn useful_memory_is_captured_in_background() {
    let f = fixture(AdvisorProvider::quiet().with(
        "memory_capture",
        r#"{"useful": true, "content": "The user plays the cello"}"#,
    ))
    .await;

    let response = f.orchestrator.respond(&session(), "I play the cello").await.unwrap();
    assert_eq!(response.text(), Some("Brahms wrote four symphonies."));

    f.orchestrator.shutdown().await;
    assert_eq!(f.notes.count().await.unwrap(), 1);
}

#[tokio::test]
async fn advisor_model_outage_does_not_block_turns() {
    let f = fixture(AdvisorProvider::default()).await;

    let response = f.orchestrator.respond(&session(), "Tell me about Chopin").await.unwrap();
    f.orchestrator.shutdown().await;

    assert_eq!(response.text(), Some("Brahms wrote four symphonies."));
    assert_eq!(f.primary.calls(), 1);
    assert_eq!(f.notes.count().await.unwrap(), 0);
}

#[tokio::test]
async fn history_carries_across_turns() {
    let f = fixture(AdvisorProvider::quiet()).await;
    let session = session();

    f.orchestrator.respond(&session, "Tell me about Brahms").await.unwrap();
    f.orchestrator.respond(&session, "And his symphonies?").await.unwrap();

    let sent = f.primary.last_request();
    let roles: Vec<Role> = sent.messages.iter().map(|m| m.role.clone()).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(sent.messages[1].content, "Tell me about Brahms");
    assert!(!sent.tools.is_empty());
}

#[tokio::test]
async fn mention_events_reach_listeners() {
    let f = fixture(AdvisorProvider::quiet()).await;
    let mut rx = f.events.subscribe();

    f.orchestrator.respond(&session(), "Ashkenazy plays Mozart").await.unwrap();

    let mut observed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let DomainEvent::MentionObserved { name, kind, .. } = &*event {
            observed.push((name.clone(), *kind));
        }
    }
    observed.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        observed,
        vec![
            ("Ashkenazy".to_string(), MentionType::Performer),
            ("Mozart".to_string(), MentionType::Composer),
        ]
    );
}

#[tokio::test]
async fn reference_documents_reach_the_primary_under_default_config() {
    let config = test_config();
    let advisor = Arc::new(AdvisorProvider::quiet());
    let model = config.retrieval.embedding_model().unwrap();
    let notes: Arc<dyn MemoryBackend> = Arc::new(VectorMemory::new(advisor.clone(), model));
    seed_documents(notes.as_ref(), default_documents()).await.unwrap();
    let f = fixture_with(config, advisor, notes).await;

    let response = f
        .orchestrator
        .respond(&session(), "When should I applaud at a concert?")
        .await
        .unwrap();

    assert_eq!(response.text(), Some("Brahms wrote four symphonies."));
    let sent = f.primary.last_request();
    let asked = &sent.messages.last().unwrap().content;
    assert!(asked.starts_with("When should I applaud at a concert?"));
    assert!(asked.contains("applauds after the last movement"));
    assert!(!asked.contains("Sonata form"));
}

#[tokio::test(start_paused = true)]
async fn performance_ack_is_not_queued_behind_memory_capture() {
    let mut config = test_config();
    config.background.max_concurrency = 1;
    config.retry.attempt_timeout_secs = Some(5);
    let advisor = AdvisorProvider::quiet()
        .slow("memory_capture", Duration::from_secs(60))
        .with_when(
            "performance_extraction",
            "Beethoven",
            r#"{"work": "Symphony No. 9", "composer": "Beethoven", "date": "2025-01-01"}"#,
        );
    let f = fixture_with(config, Arc::new(advisor), Arc::new(InMemoryBackend::new())).await;
    let session = session();

    // Leaves a slow memory capture holding the only background slot.
    f.orchestrator.respond(&session, "I play the cello").await.unwrap();
    assert_eq!(f.orchestrator.runner().pending(), 1);

    let start = tokio::time::Instant::now();
    let response = f
        .orchestrator
        .respond(&session, "Record: Beethoven 9 on 2025-01-01")
        .await
        .unwrap();

    assert_eq!(
        response.text(),
        Some("Noted! I've saved Symphony No. 9 by Beethoven on 2025-01-01.")
    );
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(f.performances.find_all().await.unwrap().len(), 1);

    f.orchestrator.shutdown().await;
    assert_eq!(f.orchestrator.runner().pending(), 0);
}
