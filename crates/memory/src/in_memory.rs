//! In-memory similarity store — useful for testing and ephemeral sessions.
//!
//! Scores are keyword overlap: the share of distinct query terms that
//! appear in a note, so a score of 1.0 means every term matched.

use async_trait::async_trait;
use maestro_core::error::MemoryError;
use maestro_core::memory::{MemoryBackend, MemoryNote, MemoryQuery};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory backend that stores notes in a Vec.
pub struct InMemoryBackend {
    notes: Arc<RwLock<Vec<MemoryNote>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            notes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Every stored note, oldest first.
    pub async fn all(&self) -> Vec<MemoryNote> {
        self.notes.read().await.clone()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased alphanumeric terms of `text`, ignoring one- and two-letter words.
pub(crate) fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn keyword_score(query_terms: &HashSet<String>, content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let hits = query_terms.iter().filter(|t| content_terms.contains(*t)).count();
    hits as f32 / query_terms.len() as f32
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, mut note: MemoryNote) -> Result<String, MemoryError> {
        if note.id.is_empty() {
            note.id = Uuid::new_v4().to_string();
        }
        let id = note.id.clone();
        self.notes.write().await.push(note);
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryNote>, MemoryError> {
        let query_terms = terms(&query.text);
        let notes = self.notes.read().await;

        let mut results: Vec<MemoryNote> = notes
            .iter()
            .map(|n| {
                let mut n = n.clone();
                n.score = keyword_score(&query_terms, &n.content);
                n
            })
            .filter(|n| n.score > 0.0 && n.score >= query.min_score)
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.limit);

        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryNote>, MemoryError> {
        let notes = self.notes.read().await;
        Ok(notes.iter().find(|n| n.id == id).cloned())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.notes.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_get() {
        let mem = InMemoryBackend::new();
        let id = mem.add(MemoryNote::new("The user plays the cello")).await.unwrap();
        assert!(!id.is_empty());

        let note = mem.get(&id).await.unwrap().unwrap();
        assert_eq!(note.content, "The user plays the cello");
    }

    #[tokio::test]
    async fn search_ranks_by_overlap() {
        let mem = InMemoryBackend::new();
        mem.add(MemoryNote::new("Brahms wrote four symphonies")).await.unwrap();
        mem.add(MemoryNote::new("Brahms wrote a violin concerto")).await.unwrap();
        mem.add(MemoryNote::new("Chopin wrote for the piano")).await.unwrap();

        let results = mem
            .search(MemoryQuery::new("Brahms violin concerto").with_limit(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("violin"));
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn threshold_filters_partial_matches() {
        let mem = InMemoryBackend::new();
        mem.add(MemoryNote::new("Mahler symphonies are long")).await.unwrap();

        let results = mem
            .search(MemoryQuery::new("Mahler songs cycles").with_min_score(0.8))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_query_matches_nothing() {
        let mem = InMemoryBackend::new();
        mem.add(MemoryNote::new("anything")).await.unwrap();
        assert!(mem.search(MemoryQuery::new("a")).await.unwrap().is_empty());
        assert_eq!(mem.count().await.unwrap(), 1);
    }
}
