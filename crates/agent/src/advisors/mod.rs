//! Concrete advisors.
//!
//! Default positions in the chain, lowest first:
//!
//! | Advisor | Order |
//! |---------|-------|
//! | [`ChatMemoryAdvisor`] | -100 |
//! | [`TopicGuardAdvisor`] | -50 |
//! | [`MentionCounterAdvisor`] | 0 |
//! | [`PerformanceCaptureAdvisor`] | 10 |
//! | [`MemoryCaptureAdvisor`] | 20 |
//! | [`RetrievalAdvisor`] | 100 |
//! | [`LoggingAdvisor`] | `i32::MAX` |

pub mod chat_memory;
pub mod logging;
pub mod memory_capture;
pub mod mention_counter;
pub mod performance_capture;
pub mod retrieval;
pub mod topic_guard;

pub use chat_memory::ChatMemoryAdvisor;
pub use logging::LoggingAdvisor;
pub use memory_capture::MemoryCaptureAdvisor;
pub use mention_counter::MentionCounterAdvisor;
pub use performance_capture::PerformanceCaptureAdvisor;
pub use retrieval::RetrievalAdvisor;
pub use topic_guard::TopicGuardAdvisor;
