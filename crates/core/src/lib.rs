//! # Maestro Core
//!
//! Domain types, traits, and error definitions for the Maestro assistant.
//! This crate performs **no I/O** — it defines the domain model and the
//! narrow contracts that every external capability is reached through.
//!
//! ## Capabilities
//!
//! Every collaborator the assistant depends on is a trait here:
//! - [`Provider`] — a language model (primary or cheaper advisor model)
//! - [`MemoryBackend`] — a similarity-searchable note store
//! - [`RecordStore`] — the persistent store for [`Mention`] and [`Performance`] records
//! - [`EventBus`] — fire-and-forget domain event publication
//! - [`Tool`] — functions the primary model may call

pub mod catalog;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod record;
pub mod tool;
pub mod topic;

// Re-export key types at crate root for ergonomics
pub use catalog::{Mention, MentionType, Performance};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryBackend, MemoryNote, MemoryQuery};
pub use message::{ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat};
pub use record::{Record, RecordStore};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use topic::Topic;
