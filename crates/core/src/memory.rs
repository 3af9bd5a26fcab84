//! Similarity store — searchable notes about the user and the domain.
//!
//! Two kinds of notes live here: memories the capture advisor decided were
//! worth keeping, and reference documents used for retrieval-augmented
//! context. The store assigns identity; the core never does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// A single note in the similarity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNote {
    /// Store-assigned ID (empty until stored)
    #[serde(default)]
    pub id: String,

    /// Free-text content
    pub content: String,

    /// Arbitrary metadata (conversation id, note kind, file name, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// When this note was created
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,

    /// Optional embedding vector
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryNote {
    /// A new, unstored note.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
            score: 0.0,
            embedding: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A query for searching notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum relevance score threshold
    #[serde(default)]
    pub min_score: f32,
}

fn default_limit() -> usize {
    4
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            min_score: 0.0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

/// The similarity store contract.
///
/// Implementations: in-memory keyword scoring (testing), embedding-backed
/// cosine similarity.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "in_memory", "vector").
    fn name(&self) -> &str;

    /// Add a note; returns the store-assigned ID.
    async fn add(&self, note: MemoryNote) -> std::result::Result<String, MemoryError>;

    /// Ranked search, best match first, scores at or above `min_score`.
    async fn search(&self, query: MemoryQuery) -> std::result::Result<Vec<MemoryNote>, MemoryError>;

    /// Get a note by ID.
    async fn get(&self, id: &str) -> std::result::Result<Option<MemoryNote>, MemoryError>;

    /// Total number of notes.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_query_defaults() {
        let query = MemoryQuery::new("favourite composer");
        assert_eq!(query.limit, 4);
        assert_eq!(query.min_score, 0.0);
    }

    #[test]
    fn note_metadata_serializes() {
        let note = MemoryNote::new("The user plays the cello")
            .with_metadata("conversation_id", "quirky_bach");
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("plays the cello"));
        assert!(json.contains("quirky_bach"));
    }
}
