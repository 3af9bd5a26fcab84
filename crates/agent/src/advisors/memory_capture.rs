//! Memory capture — remembers lasting facts about the user.
//!
//! The decision is an extra advisor-model call made in the background, so
//! the reply is never held up by it.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next};
use crate::background::TaskRunner;
use crate::extract::{BasisExtractor, default_extractor};
use crate::model::AdvisorModel;
use crate::prompts;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::error::Error;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::memory::{MemoryBackend, MemoryNote};
use maestro_core::message::ConversationId;
use maestro_core::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Prefix of every note written by this advisor.
pub const NOTE_PREFIX: &str = "Remember this about the user:";

#[derive(Debug, Deserialize)]
struct MemoryVerdict {
    #[serde(default)]
    content: Option<String>,
    useful: bool,
}

impl MemoryVerdict {
    fn worth_keeping(&self) -> Option<&str> {
        match (self.useful, self.content.as_deref().map(str::trim)) {
            (true, Some(content)) if !content.is_empty() => Some(content),
            _ => None,
        }
    }
}

/// Writes a note to the similarity store when the advisor model says the
/// user's message is worth remembering.
///
/// Always continues the chain straight away.
pub struct MemoryCaptureAdvisor {
    shared: Arc<Shared>,
    runner: TaskRunner,
    order: i32,
}

#[derive(Clone)]
struct Shared {
    model: AdvisorModel,
    notes: Arc<dyn MemoryBackend>,
    retry: RetryPolicy,
    extractor: BasisExtractor,
    events: Option<Arc<EventBus>>,
}

impl MemoryCaptureAdvisor {
    pub const DEFAULT_ORDER: i32 = 20;

    pub fn new(model: AdvisorModel, notes: Arc<dyn MemoryBackend>, runner: TaskRunner) -> Self {
        Self {
            shared: Arc::new(Shared {
                model,
                notes,
                retry: RetryPolicy::default(),
                extractor: default_extractor(),
                events: None,
            }),
            runner,
            order: Self::DEFAULT_ORDER,
        }
    }

    fn shared_mut(&mut self) -> &mut Shared {
        Arc::make_mut(&mut self.shared)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.shared_mut().retry = retry;
        self
    }

    pub fn with_extractor(mut self, extractor: BasisExtractor) -> Self {
        self.shared_mut().extractor = extractor;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.shared_mut().events = Some(events);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl Shared {
    /// One attempt: classify, and store the note if it is worth keeping.
    async fn extract_memory(&self, basis: &str, conversation_id: &ConversationId) -> Result<Option<String>> {
        let verdict: MemoryVerdict = self
            .model
            .ask(prompts::CAPTURE_MEMORY, basis, prompts::memory_schema())
            .await?;

        let Some(content) = verdict.worth_keeping() else {
            info!(conversation_id = %conversation_id, useful = verdict.useful, "Ignoring useless potential memory");
            return Ok(None);
        };

        let note = MemoryNote::new(format!("{NOTE_PREFIX}\n{content}"))
            .with_metadata("conversation_id", conversation_id.as_str())
            .with_metadata("kind", "user_memory");
        let note_id = self.notes.add(note).await?;
        info!(conversation_id = %conversation_id, %note_id, content, "Adding memory");

        if let Some(events) = &self.events {
            events.publish(DomainEvent::MemoryCaptured {
                conversation_id: conversation_id.to_string(),
                note_id: note_id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(Some(note_id))
    }

    async fn capture(self: Arc<Self>, basis: String, conversation_id: ConversationId) -> Result<Option<String>> {
        let this = self.as_ref();
        let (basis, conversation_id) = (basis.as_str(), &conversation_id);
        this.retry
            .execute("memory_capture", move || this.extract_memory(basis, conversation_id))
            .await
            .inspect_err(|e: &Error| {
                error!(error = %e, "Model kept failing to classify memory, giving up");
            })
    }
}

#[async_trait]
impl Advisor for MemoryCaptureAdvisor {
    fn name(&self) -> &str {
        "memory_capture"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let basis = (self.shared.extractor)(&request);
        if !basis.trim().is_empty() {
            let work = Arc::clone(&self.shared).capture(basis, request.conversation_id().clone());
            drop(self.runner.spawn("memory_capture", work));
        }
        next.run(request).await
    }
}
