//! The advisor contract.
//!
//! An [`Advisor`] wraps one exchange with the model. It receives the request
//! and a [`Next`] continuation standing for the rest of the chain, and must
//! do exactly one of:
//!
//! - call `next.run(request)` and return its result unchanged,
//! - call `next.run(..)` and post-process the response,
//! - not call `next` at all and build a response itself (short-circuit).
//!
//! Advisors hold no per-request mutable state, so one instance can serve
//! concurrent turns of different conversations.

use async_trait::async_trait;
use maestro_core::message::{ConversationId, Message};
use maestro_core::provider::Usage;
use maestro_core::Result;
use std::sync::Arc;

/// Opaque key/value data carried through the chain.
///
/// Keys in use are listed in [`keys`].
pub type ContextBag = serde_json::Map<String, serde_json::Value>;

/// Context bag keys, with the advisor that writes each.
pub mod keys {
    /// Conversation id string (orchestrator).
    pub const CONVERSATION_ID: &str = "chat_memory_conversation_id";
    /// How many history messages to load (orchestrator).
    pub const RETRIEVE_SIZE: &str = "chat_memory_retrieve_size";
    /// Names found in the user text (mention counter).
    pub const MENTIONS_OBSERVED: &str = "mentions_observed";
    /// Classified topic (topic guard).
    pub const TOPIC: &str = "topic";
    /// Id of a saved performance (performance capture).
    pub const PERFORMANCE_ID: &str = "performance_id";
    /// Ids of notes appended as context (retrieval).
    pub const RETRIEVED_DOCUMENTS: &str = "retrieved_documents";
}

/// One user turn on its way to the model.
///
/// Immutable: advisors that need a different request derive one with the
/// `with_*` methods, which consume `self` and return a new value.
#[derive(Debug, Clone)]
pub struct AdvisedRequest {
    user_text: String,
    conversation_id: ConversationId,
    system_prompt: Option<String>,
    history: Vec<Message>,
    context: ContextBag,
}

impl AdvisedRequest {
    pub fn new(conversation_id: ConversationId, user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            conversation_id,
            system_prompt: None,
            history: Vec::new(),
            context: ContextBag::new(),
        }
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn context(&self) -> &ContextBag {
        &self.context
    }

    pub fn with_user_text(self, user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..self
        }
    }

    pub fn with_system_prompt(self, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..self
        }
    }

    pub fn with_history(self, history: Vec<Message>) -> Self {
        Self { history, ..self }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// System prompt, then history, then the user text.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.as_str()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(self.user_text.as_str()));
        messages
    }
}

/// One reply candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

impl Generation {
    /// A reply produced without a model call.
    pub fn canned(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            usage: None,
        }
    }
}

/// The outcome of one turn, with the context bag carried forward.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisedResponse {
    generations: Vec<Generation>,
    context: ContextBag,
}

impl AdvisedResponse {
    pub fn new(generations: Vec<Generation>, context: ContextBag) -> Self {
        Self { generations, context }
    }

    /// A short-circuit reply that keeps the request's context.
    pub fn canned(text: impl Into<String>, request: &AdvisedRequest) -> Self {
        Self::new(vec![Generation::canned(text)], request.context.clone())
    }

    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Text of the first generation, if any.
    pub fn text(&self) -> Option<&str> {
        self.generations.first().map(|g| g.content.as_str())
    }

    pub fn context(&self) -> &ContextBag {
        &self.context
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// An interceptor around one model exchange.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Position in the chain; lower runs first, ties keep insertion order.
    fn order(&self) -> i32 {
        0
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse>;
}

/// The step after the last advisor: the actual model call.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn respond(&self, request: AdvisedRequest) -> Result<AdvisedResponse>;
}

/// The rest of the chain, as seen by one advisor.
///
/// Nothing downstream runs until [`Next::run`] is called.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    advisors: &'a [Arc<dyn Advisor>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(advisors: &'a [Arc<dyn Advisor>], terminal: &'a dyn Terminal) -> Self {
        Self { advisors, terminal }
    }

    /// Continue the chain with `request`.
    pub async fn run(self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        match self.advisors.split_first() {
            Some((head, rest)) => head.advise(request, Next::new(rest, self.terminal)).await,
            None => self.terminal.respond(request).await,
        }
    }
}
