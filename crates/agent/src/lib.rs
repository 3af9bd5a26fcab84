//! The advisor chain — the heart of Maestro.
//!
//! One user turn is a single exchange with the primary model, wrapped by an
//! ordered chain of [`Advisor`]s:
//!
//! 1. **Chat memory** loads the conversation history
//! 2. **Topic guard** refuses banned subjects before anything else happens
//! 3. **Mention counter** bumps counters for known names in the user text
//! 4. **Performance capture** saves announced performances and acknowledges them
//! 5. **Memory capture** decides in the background whether to remember something
//! 6. **Retrieval** appends related notes to the user text
//! 7. **Logging** records what goes to the model and what comes back
//!
//! The terminal step calls the primary model, running any tool calls it asks
//! for. Any advisor may answer on its own and skip the rest of the chain.

pub mod advisor;
pub mod advisors;
pub mod background;
pub mod chain;
pub mod extract;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod terminal;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use advisor::{AdvisedRequest, AdvisedResponse, Advisor, ContextBag, Generation, Next, Terminal, keys};
pub use advisors::{
    ChatMemoryAdvisor, LoggingAdvisor, MemoryCaptureAdvisor, MentionCounterAdvisor,
    PerformanceCaptureAdvisor, RetrievalAdvisor, TopicGuardAdvisor,
};
pub use background::{TaskHandle, TaskRunner};
pub use chain::AdvisorChain;
pub use extract::{BasisExtractor, user_content};
pub use model::AdvisorModel;
pub use orchestrator::{ChatOrchestrator, Components, ConversationSession, MobyNameGenerator, NameGenerator};
pub use retry::RetryPolicy;
pub use terminal::PrimaryModel;
