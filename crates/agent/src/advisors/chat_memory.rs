//! Chat memory — replays the conversation so far to the model.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, keys};
use async_trait::async_trait;
use maestro_core::message::{ConversationId, Message};
use maestro_core::Result;
use maestro_memory::ChatMemory;
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads recent history into the request and records the finished turn.
///
/// The conversation id and window size may be overridden per request via
/// [`keys::CONVERSATION_ID`] and [`keys::RETRIEVE_SIZE`]. Short-circuited
/// turns are recorded too, so the model later sees the refusal or
/// acknowledgement it never produced.
pub struct ChatMemoryAdvisor {
    memory: Arc<dyn ChatMemory>,
    retrieve_size: usize,
    order: i32,
}

impl ChatMemoryAdvisor {
    pub const DEFAULT_ORDER: i32 = -100;
    pub const DEFAULT_RETRIEVE_SIZE: usize = 50;

    pub fn new(memory: Arc<dyn ChatMemory>) -> Self {
        Self {
            memory,
            retrieve_size: Self::DEFAULT_RETRIEVE_SIZE,
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn with_retrieve_size(mut self, retrieve_size: usize) -> Self {
        self.retrieve_size = retrieve_size;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn conversation_id(request: &AdvisedRequest) -> ConversationId {
        request
            .context()
            .get(keys::CONVERSATION_ID)
            .and_then(|v| v.as_str())
            .map(ConversationId::from)
            .unwrap_or_else(|| request.conversation_id().clone())
    }

    fn retrieve_size(&self, request: &AdvisedRequest) -> usize {
        request
            .context()
            .get(keys::RETRIEVE_SIZE)
            .and_then(|v| v.as_u64())
            .map_or(self.retrieve_size, |n| n as usize)
    }
}

#[async_trait]
impl Advisor for ChatMemoryAdvisor {
    fn name(&self) -> &str {
        "chat_memory"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let conversation_id = Self::conversation_id(&request);
        let size = self.retrieve_size(&request);

        let mut history = match self.memory.get(&conversation_id, size).await {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Could not load chat history");
                Vec::new()
            }
        };
        debug!(conversation_id = %conversation_id, messages = history.len(), "Loaded chat history");

        let user_message = Message::user(request.user_text());
        history.extend(request.history().iter().cloned());
        let response = next.run(request.with_history(history)).await?;

        let mut turn = vec![user_message];
        if let Some(text) = response.text() {
            turn.push(Message::assistant(text));
        }
        if let Err(e) = self.memory.add(&conversation_id, turn).await {
            warn!(conversation_id = %conversation_id, error = %e, "Could not record chat turn");
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::AdvisorChain;
    use crate::test_helpers::EchoTerminal;
    use maestro_core::message::Role;
    use maestro_memory::InMemoryChatMemory;

    fn request(text: &str) -> AdvisedRequest {
        AdvisedRequest::new(ConversationId::from("merry_mozart"), text)
    }

    #[tokio::test]
    async fn history_grows_turn_by_turn() {
        let memory = Arc::new(InMemoryChatMemory::new());
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(vec![Arc::new(ChatMemoryAdvisor::new(memory.clone()))], terminal.clone());

        chain.call(request("Tell me about Brahms")).await.unwrap();
        chain.call(request("And his symphonies?")).await.unwrap();

        let seen = terminal.last_request().unwrap();
        assert_eq!(seen.history().len(), 2);
        assert_eq!(seen.history()[0].content, "Tell me about Brahms");
        assert_eq!(seen.history()[1].role, Role::Assistant);
        assert_eq!(seen.history()[1].content, "echo: Tell me about Brahms");

        let stored = memory.get(&ConversationId::from("merry_mozart"), 50).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn retrieve_size_from_context_limits_window() {
        let memory = Arc::new(InMemoryChatMemory::new());
        let id = ConversationId::from("merry_mozart");
        for i in 0..10 {
            memory.add(&id, vec![Message::user(format!("old {i}"))]).await.unwrap();
        }
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(vec![Arc::new(ChatMemoryAdvisor::new(memory))], terminal.clone());

        chain.call(request("new").with_context(keys::RETRIEVE_SIZE, 3)).await.unwrap();

        let seen = terminal.last_request().unwrap();
        let contents: Vec<&str> = seen.history().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["old 7", "old 8", "old 9"]);
    }

    #[tokio::test]
    async fn conversation_id_from_context_wins() {
        let memory = Arc::new(InMemoryChatMemory::new());
        let chain = AdvisorChain::new(
            vec![Arc::new(ChatMemoryAdvisor::new(memory.clone()))],
            Arc::new(EchoTerminal::default()),
        );

        chain
            .call(request("hello").with_context(keys::CONVERSATION_ID, "other_session"))
            .await
            .unwrap();

        assert_eq!(memory.get(&ConversationId::from("other_session"), 50).await.unwrap().len(), 2);
        assert!(memory.get(&ConversationId::from("merry_mozart"), 50).await.unwrap().is_empty());
    }
}
