//! Conversation history, keyed by conversation id.

use async_trait::async_trait;
use maestro_core::error::MemoryError;
use maestro_core::message::{ConversationId, Message};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Stores the message history of each conversation.
#[async_trait]
pub trait ChatMemory: Send + Sync {
    /// The last `last_n` messages of a conversation, oldest first.
    async fn get(&self, conversation_id: &ConversationId, last_n: usize) -> Result<Vec<Message>, MemoryError>;

    /// Append messages to a conversation.
    async fn add(&self, conversation_id: &ConversationId, messages: Vec<Message>) -> Result<(), MemoryError>;

    /// Forget a conversation.
    async fn clear(&self, conversation_id: &ConversationId) -> Result<(), MemoryError>;
}

/// Messages kept per conversation unless configured otherwise.
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

/// Process-local history store.
///
/// Each conversation keeps at most `max_messages`; older ones are dropped
/// as new ones arrive.
pub struct InMemoryChatMemory {
    conversations: RwLock<HashMap<ConversationId, Vec<Message>>>,
    max_messages: usize,
}

impl InMemoryChatMemory {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    /// Clamped to at least one.
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }
}

impl Default for InMemoryChatMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMemory for InMemoryChatMemory {
    async fn get(&self, conversation_id: &ConversationId, last_n: usize) -> Result<Vec<Message>, MemoryError> {
        let conversations = self.conversations.read().await;
        let history = conversations.get(conversation_id).map(Vec::as_slice).unwrap_or_default();
        let skip = history.len().saturating_sub(last_n);
        Ok(history[skip..].to_vec())
    }

    async fn add(&self, conversation_id: &ConversationId, messages: Vec<Message>) -> Result<(), MemoryError> {
        let mut conversations = self.conversations.write().await;
        let history = conversations.entry(conversation_id.clone()).or_default();
        history.extend(messages);
        let excess = history.len().saturating_sub(self.max_messages);
        history.drain(..excess);
        Ok(())
    }

    async fn clear(&self, conversation_id: &ConversationId) -> Result<(), MemoryError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_most_recent_window() {
        let memory = InMemoryChatMemory::new();
        let id = ConversationId::from("merry_mozart");
        for i in 0..5 {
            memory.add(&id, vec![Message::user(format!("turn {i}"))]).await.unwrap();
        }

        let window = memory.get(&id, 2).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "turn 3");
        assert_eq!(window[1].content, "turn 4");
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let memory = InMemoryChatMemory::new();
        let a = ConversationId::from("a");
        let b = ConversationId::from("b");
        memory.add(&a, vec![Message::user("hello")]).await.unwrap();

        assert!(memory.get(&b, 50).await.unwrap().is_empty());
        memory.clear(&a).await.unwrap();
        assert!(memory.get(&a, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_capped() {
        let memory = InMemoryChatMemory::new().with_max_messages(3);
        let id = ConversationId::from("steady_schubert");
        for i in 0..10 {
            memory
                .add(&id, vec![Message::user(format!("q{i}")), Message::assistant(format!("a{i}"))])
                .await
                .unwrap();
        }

        let kept = memory.get(&id, 100).await.unwrap();
        let contents: Vec<_> = kept.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a8", "q9", "a9"]);
    }
}
