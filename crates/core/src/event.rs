//! Domain events — fire-and-forget notifications to external listeners.
//!
//! Advisors publish here when something worth observing happens; nothing
//! on the request path ever waits for a listener.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::catalog::MentionType;
use crate::topic::Topic;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tracked entity appeared in the user's text
    MentionObserved {
        name: String,
        kind: MentionType,
        timestamp: DateTime<Utc>,
    },

    /// A memory note was written about the user
    MemoryCaptured {
        conversation_id: String,
        note_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A performance record was extracted and saved
    PerformanceSaved {
        id: String,
        work: String,
        composer: String,
        date: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    /// The topic guard refused a turn
    TopicBlocked {
        conversation_id: String,
        topic: Topic,
        timestamp: DateTime<Utc>,
    },

    /// The primary model produced a reply
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
