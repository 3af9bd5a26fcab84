//! Chat orchestration — assembles the chain and drives one turn through it.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, keys};
use crate::advisors::{
    ChatMemoryAdvisor, LoggingAdvisor, MemoryCaptureAdvisor, MentionCounterAdvisor,
    PerformanceCaptureAdvisor, RetrievalAdvisor, TopicGuardAdvisor,
};
use crate::background::TaskRunner;
use crate::chain::AdvisorChain;
use crate::model::AdvisorModel;
use crate::prompts::SYSTEM_PROMPT;
use crate::retry::RetryPolicy;
use crate::terminal::PrimaryModel;
use maestro_config::AppConfig;
use maestro_core::catalog::{Mention, Performance};
use maestro_core::event::EventBus;
use maestro_core::memory::MemoryBackend;
use maestro_core::message::ConversationId;
use maestro_core::provider::Provider;
use maestro_core::record::RecordStore;
use maestro_core::tool::ToolRegistry;
use maestro_core::Result;
use maestro_memory::ChatMemory;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Generates conversation ids.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "adagio", "bold", "brisk", "dolce", "gentle", "grand", "lively", "merry",
    "noble", "quiet", "serene", "spirited", "tender", "vivid", "wistful", "zesty",
];

const SURNAMES: &[&str] = &[
    "bach", "beethoven", "brahms", "britten", "chopin", "debussy", "dvorak", "elgar",
    "handel", "haydn", "mahler", "mozart", "ravel", "schubert", "sibelius", "verdi",
];

/// `adjective_surname_suffix` names, e.g. `merry_mozart_1a2b3c4d`.
///
/// The suffix comes from a random uuid, so names stay unique.
#[derive(Debug, Default, Clone, Copy)]
pub struct MobyNameGenerator;

impl NameGenerator for MobyNameGenerator {
    fn generate(&self) -> String {
        let id = Uuid::new_v4();
        let bytes = id.as_bytes();
        let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
        let surname = SURNAMES[bytes[1] as usize % SURNAMES.len()];
        let suffix = &id.simple().to_string()[..8];
        format!("{adjective}_{surname}_{suffix}")
    }
}

/// One ongoing conversation: its id and the system prompt it runs under.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: ConversationId,
    system_prompt: String,
}

impl ConversationSession {
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn generated(names: &dyn NameGenerator) -> Self {
        Self::new(ConversationId(names.generate()))
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

/// Everything the default chain is built from.
pub struct Components {
    /// Answers the user
    pub primary: Arc<dyn Provider>,
    /// Classification and extraction side-calls
    pub advisor: Arc<dyn Provider>,
    pub mentions: Arc<dyn RecordStore<Mention>>,
    pub performances: Arc<dyn RecordStore<Performance>>,
    /// Memory notes about the user, also searched for retrieval
    pub notes: Arc<dyn MemoryBackend>,
    pub chat_memory: Arc<dyn ChatMemory>,
    pub events: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
}

/// Drives user turns through an [`AdvisorChain`].
pub struct ChatOrchestrator {
    chain: AdvisorChain,
    runner: TaskRunner,
    names: Arc<dyn NameGenerator>,
    retrieve_size: usize,
}

impl ChatOrchestrator {
    pub fn new(chain: AdvisorChain, runner: TaskRunner) -> Self {
        Self {
            chain,
            runner,
            names: Arc::new(MobyNameGenerator),
            retrieve_size: ChatMemoryAdvisor::DEFAULT_RETRIEVE_SIZE,
        }
    }

    /// Build the standard chain, leaving out advisors disabled in `config`.
    pub fn from_config(config: &AppConfig, components: Components) -> Self {
        let runner = TaskRunner::new(config.background.max_concurrency);
        let retry = RetryPolicy::from_config(&config.retry);
        let advisor_model = AdvisorModel::from_config(components.advisor, &config.advisor_model);

        let mut advisors: Vec<Arc<dyn Advisor>> = vec![
            Arc::new(
                ChatMemoryAdvisor::new(components.chat_memory)
                    .with_retrieve_size(config.chat_memory.retrieve_size),
            ),
            Arc::new(MentionCounterAdvisor::new(components.mentions, components.events.clone())),
            Arc::new(LoggingAdvisor),
        ];

        if config.topic_guard.enabled {
            advisors.push(Arc::new(
                TopicGuardAdvisor::from_config(advisor_model.clone(), &config.topic_guard)
                    .with_retry(retry.clone())
                    .with_events(components.events.clone()),
            ));
        }
        if config.performance_capture.enabled {
            advisors.push(Arc::new(
                PerformanceCaptureAdvisor::new(advisor_model.clone(), components.performances, runner.clone())
                    .with_retry(retry.clone())
                    .with_acknowledgement(config.performance_capture.acknowledgement.as_str())
                    .with_events(components.events.clone()),
            ));
        }
        if config.memory_capture.enabled {
            advisors.push(Arc::new(
                MemoryCaptureAdvisor::new(advisor_model, components.notes.clone(), runner.clone())
                    .with_retry(retry)
                    .with_events(components.events.clone()),
            ));
        }
        if config.retrieval.enabled {
            advisors.push(Arc::new(
                RetrievalAdvisor::new(components.notes)
                    .with_similarity_threshold(config.retrieval.threshold())
                    .with_top_k(config.retrieval.top_k),
            ));
        }

        let terminal = PrimaryModel::from_config(components.primary, &config.primary)
            .with_tools(components.tools)
            .with_events(components.events);

        let chain = AdvisorChain::new(advisors, Arc::new(terminal));
        info!(advisors = ?chain.names(), "Advisor chain assembled");

        Self::new(chain, runner).with_retrieve_size(config.chat_memory.retrieve_size)
    }

    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_retrieve_size(mut self, retrieve_size: usize) -> Self {
        self.retrieve_size = retrieve_size;
        self
    }

    /// Start a conversation with a freshly generated id.
    pub fn new_session(&self) -> ConversationSession {
        ConversationSession::generated(self.names.as_ref())
    }

    /// Run one user turn.
    ///
    /// Fails only when the primary model fails.
    pub async fn respond(&self, session: &ConversationSession, text: &str) -> Result<AdvisedResponse> {
        debug!(conversation_id = %session.id(), "User turn");
        let request = AdvisedRequest::new(session.id().clone(), text)
            .with_system_prompt(session.system_prompt())
            .with_context(keys::CONVERSATION_ID, session.id().as_str())
            .with_context(keys::RETRIEVE_SIZE, self.retrieve_size);
        self.chain.call(request).await
    }

    pub fn chain(&self) -> &AdvisorChain {
        &self.chain
    }

    /// The pool running background advisor work.
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Wait for in-flight background work, e.g. before exiting.
    pub async fn shutdown(&self) {
        self.runner.wait_idle().await;
    }
}
