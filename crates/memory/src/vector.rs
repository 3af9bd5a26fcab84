//! Embedding-backed similarity store and the cosine-similarity helpers it uses.

use async_trait::async_trait;
use maestro_core::error::MemoryError;
use maestro_core::memory::{MemoryBackend, MemoryNote, MemoryQuery};
use maestro_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the vectors differ in length or either is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank notes by cosine similarity to a query embedding.
///
/// Notes without an embedding are skipped. `score` is set to the similarity.
pub fn vector_search(
    notes: &[MemoryNote],
    query_embedding: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<MemoryNote> {
    let mut scored: Vec<MemoryNote> = notes
        .iter()
        .filter_map(|note| {
            let sim = cosine_similarity(note.embedding.as_ref()?, query_embedding);
            (sim >= min_score).then(|| {
                let mut n = note.clone();
                n.score = sim;
                n
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// A similarity store that embeds notes through a [`Provider`].
pub struct VectorMemory {
    provider: Arc<dyn Provider>,
    model: String,
    notes: RwLock<Vec<MemoryNote>>,
}

impl VectorMemory {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            notes: RwLock::new(Vec::new()),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("provider returned no embedding".into()))
    }
}

#[async_trait]
impl MemoryBackend for VectorMemory {
    fn name(&self) -> &str {
        "vector"
    }

    async fn add(&self, mut note: MemoryNote) -> Result<String, MemoryError> {
        if note.embedding.is_none() {
            note.embedding = Some(self.embed_one(&note.content).await?);
        }
        if note.id.is_empty() {
            note.id = Uuid::new_v4().to_string();
        }
        let id = note.id.clone();
        self.notes.write().await.push(note);
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryNote>, MemoryError> {
        let embedding = self.embed_one(&query.text).await?;
        let notes = self.notes.read().await;
        let results = vector_search(&notes, &embedding, query.limit, query.min_score);
        debug!(hits = results.len(), total = notes.len(), "Vector search complete");
        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryNote>, MemoryError> {
        Ok(self.notes.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.notes.read().await.len())
    }
}
