//! Retrieval — appends related notes to the user text.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, keys};
use crate::prompts::{RETRIEVED_CONTEXT_FOOTER, RETRIEVED_CONTEXT_HEADER};
use async_trait::async_trait;
use maestro_core::memory::{MemoryBackend, MemoryNote, MemoryQuery};
use maestro_core::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Searches the similarity store with the user text and, on a hit, derives
/// a request whose text is the original, a blank line, then the notes.
pub struct RetrievalAdvisor {
    store: Arc<dyn MemoryBackend>,
    similarity_threshold: f32,
    top_k: usize,
    order: i32,
}

impl RetrievalAdvisor {
    pub const DEFAULT_ORDER: i32 = 100;

    pub fn new(store: Arc<dyn MemoryBackend>) -> Self {
        Self {
            store,
            similarity_threshold: 0.8,
            top_k: 4,
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

fn augment(user_text: &str, notes: &[MemoryNote]) -> String {
    let body: Vec<&str> = notes.iter().map(|n| n.content.as_str()).collect();
    format!(
        "{user_text}\n\n{RETRIEVED_CONTEXT_HEADER}\n{}\n{RETRIEVED_CONTEXT_FOOTER}",
        body.join("\n")
    )
}

#[async_trait]
impl Advisor for RetrievalAdvisor {
    fn name(&self) -> &str {
        "retrieval"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let query = MemoryQuery::new(request.user_text())
            .with_limit(self.top_k)
            .with_min_score(self.similarity_threshold);

        let notes = match self.store.search(query).await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                return next.run(request).await;
            }
        };

        if notes.is_empty() {
            return next.run(request).await;
        }

        debug!(count = notes.len(), "Appending retrieved notes");
        let augmented = augment(request.user_text(), &notes);
        let ids: Vec<String> = notes.into_iter().map(|n| n.id).collect();
        next.run(
            request
                .with_user_text(augmented)
                .with_context(keys::RETRIEVED_DOCUMENTS, ids),
        )
        .await
    }
}
