//! Storage implementations for Maestro.
//!
//! - Record stores for [`Mention`](maestro_core::Mention) and
//!   [`Performance`](maestro_core::Performance): in-memory and SQLite.
//! - Similarity stores for memory notes and reference documents: keyword
//!   scoring in memory, or embedding-backed cosine similarity.
//! - Conversation history for the chat memory advisor.

pub mod chat_memory;
pub mod in_memory;
pub mod record_store;
pub mod seed;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chat_memory::{ChatMemory, InMemoryChatMemory};
pub use in_memory::InMemoryBackend;
pub use record_store::InMemoryRecordStore;
pub use seed::{FILENAME_KEY, default_documents, default_mentions, read_documents, seed_documents, seed_mentions};
pub use vector::{VectorMemory, cosine_similarity, vector_search};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;
