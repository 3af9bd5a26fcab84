//! Composition of advisors into one callable.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, Terminal};
use maestro_core::Result;
use std::sync::Arc;
use tracing::debug;

/// An ordered list of advisors in front of a terminal step.
///
/// Building a chain only sorts a vector; it does no I/O.
#[derive(Clone)]
pub struct AdvisorChain {
    advisors: Vec<Arc<dyn Advisor>>,
    terminal: Arc<dyn Terminal>,
}

impl AdvisorChain {
    /// Sort `advisors` by [`Advisor::order`], keeping insertion order for ties.
    pub fn new(mut advisors: Vec<Arc<dyn Advisor>>, terminal: Arc<dyn Terminal>) -> Self {
        advisors.sort_by_key(|a| a.order());
        Self { advisors, terminal }
    }

    /// Advisor names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.advisors.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// Run one request through every advisor and the terminal step.
    pub async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        debug!(
            conversation_id = %request.conversation_id(),
            advisors = self.advisors.len(),
            "Running advisor chain"
        );
        Next::new(&self.advisors, self.terminal.as_ref()).run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{Generation, keys};
    use crate::test_helpers::EchoTerminal;
    use async_trait::async_trait;
    use maestro_core::message::ConversationId;
    use std::sync::Mutex;

    /// Records its name on the way in, then passes through.
    struct Tracer {
        name: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Advisor for Tracer {
        fn name(&self) -> &str {
            self.name
        }
        fn order(&self) -> i32 {
            self.order
        }
        async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
            self.log.lock().unwrap().push(self.name);
            next.run(request).await
        }
    }

    struct Refuser;

    #[async_trait]
    impl Advisor for Refuser {
        fn name(&self) -> &str {
            "refuser"
        }
        async fn advise(&self, request: AdvisedRequest, _next: Next<'_>) -> Result<AdvisedResponse> {
            Ok(AdvisedResponse::canned("No.", &request))
        }
    }

    /// Post-processes the downstream reply.
    struct Shouter;

    #[async_trait]
    impl Advisor for Shouter {
        fn name(&self) -> &str {
            "shouter"
        }
        async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
            let response = next.run(request).await?;
            let generations = response
                .generations()
                .iter()
                .map(|g| Generation { content: g.content.to_uppercase(), ..g.clone() })
                .collect();
            Ok(AdvisedResponse::new(generations, response.context().clone()))
        }
    }

    fn tracer(name: &'static str, order: i32, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Advisor> {
        Arc::new(Tracer { name, order, log: log.clone() })
    }

    fn request(text: &str) -> AdvisedRequest {
        AdvisedRequest::new(ConversationId::from("test"), text)
    }

    #[tokio::test]
    async fn runs_in_order_with_stable_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AdvisorChain::new(
            vec![
                tracer("b", 0, &log),
                tracer("late", 10, &log),
                tracer("c", 0, &log),
                tracer("first", -5, &log),
            ],
            Arc::new(EchoTerminal::default()),
        );

        assert_eq!(chain.names(), vec!["first", "b", "c", "late"]);
        chain.call(request("hi")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "b", "c", "late"]);
    }

    #[tokio::test]
    async fn pass_through_equals_terminal_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(vec![tracer("a", 0, &log), tracer("b", 1, &log)], terminal.clone());

        let req = request("Tell me about Chopin").with_context(keys::RETRIEVE_SIZE, 50);
        let via_chain = chain.call(req.clone()).await.unwrap();
        let direct = terminal.respond(req).await.unwrap();
        assert_eq!(via_chain, direct);
    }

    #[tokio::test]
    async fn short_circuit_skips_rest_of_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(
            vec![tracer("before", 0, &log), Arc::new(Refuser), tracer("after", 0, &log)],
            terminal.clone(),
        );

        let response = chain.call(request("hi")).await.unwrap();
        assert_eq!(response.text(), Some("No."));
        assert_eq!(*log.lock().unwrap(), vec!["before"]);
        assert_eq!(terminal.calls(), 0);
    }

    #[tokio::test]
    async fn post_processing_sees_downstream_reply() {
        let chain = AdvisorChain::new(vec![Arc::new(Shouter)], Arc::new(EchoTerminal::default()));
        let response = chain.call(request("bravo")).await.unwrap();
        assert_eq!(response.text(), Some("ECHO: BRAVO"));
    }

    #[tokio::test]
    async fn empty_chain_is_terminal_only() {
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(Vec::new(), terminal.clone());
        assert!(chain.is_empty());
        let response = chain.call(request("hi")).await.unwrap();
        assert_eq!(response.text(), Some("echo: hi"));
        assert_eq!(terminal.calls(), 1);
    }
}
