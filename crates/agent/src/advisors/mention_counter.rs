//! Mention counter — counts how often users bring up known names.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, keys};
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::catalog::Mention;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::record::RecordStore;
use maestro_core::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bumps the counter of every known mention found in the user text.
///
/// Runs to completion before the rest of the chain and never short-circuits.
/// Store failures are logged; the turn carries on.
pub struct MentionCounterAdvisor {
    mentions: Arc<dyn RecordStore<Mention>>,
    events: Arc<EventBus>,
    order: i32,
}

impl MentionCounterAdvisor {
    pub const DEFAULT_ORDER: i32 = 0;

    pub fn new(mentions: Arc<dyn RecordStore<Mention>>, events: Arc<EventBus>) -> Self {
        Self {
            mentions,
            events,
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    async fn note_mention(&self, mention: &Mention) {
        self.events.publish(DomainEvent::MentionObserved {
            name: mention.name.clone(),
            kind: mention.kind,
            timestamp: Utc::now(),
        });

        match self.mentions.update(&mention.name, &|m: Mention| m.increment()).await {
            Ok(Some(updated)) => debug!(name = %updated.name, count = updated.count, "Mention counted"),
            Ok(None) => debug!(name = %mention.name, "Mention vanished before it could be counted"),
            Err(e) => warn!(name = %mention.name, error = %e, "Failed to count mention"),
        }
    }
}

#[async_trait]
impl Advisor for MentionCounterAdvisor {
    fn name(&self) -> &str {
        "mention_counter"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let known = match self.mentions.find_all().await {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, "Could not load mention vocabulary");
                return next.run(request).await;
            }
        };

        let mentioned: Vec<&Mention> = known
            .iter()
            .filter(|m| m.is_mentioned_in(request.user_text()))
            .collect();

        if mentioned.is_empty() {
            return next.run(request).await;
        }

        for mention in &mentioned {
            self.note_mention(mention).await;
        }

        let names: Vec<String> = mentioned.iter().map(|m| m.name.clone()).collect();
        next.run(request.with_context(keys::MENTIONS_OBSERVED, names)).await
    }
}
