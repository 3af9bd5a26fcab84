//! Logging advisor — records what goes to the model and what comes back.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next};
use async_trait::async_trait;
use maestro_core::Result;
use tracing::debug;

/// Pass-through that logs the request and response at `debug`.
#[derive(Debug, Default)]
pub struct LoggingAdvisor;

#[async_trait]
impl Advisor for LoggingAdvisor {
    fn name(&self) -> &str {
        "logging"
    }

    fn order(&self) -> i32 {
        i32::MAX
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        debug!(
            conversation_id = %request.conversation_id(),
            user_text = %request.user_text(),
            history = request.history().len(),
            context = ?request.context(),
            "request"
        );

        let response = next.run(request).await?;

        let first = response.generations().first();
        debug!(
            text = response.text().unwrap_or_default(),
            model = first.and_then(|g| g.model.as_deref()).unwrap_or("none"),
            tokens = first.and_then(|g| g.usage.as_ref()).map(|u| u.total_tokens),
            generations = response.generations().len(),
            "response"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::Terminal;
    use crate::chain::AdvisorChain;
    use crate::test_helpers::EchoTerminal;
    use maestro_core::message::ConversationId;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_last_and_passes_through() {
        let terminal = Arc::new(EchoTerminal::default());
        let chain = AdvisorChain::new(vec![Arc::new(LoggingAdvisor)], terminal.clone());
        let request = AdvisedRequest::new(ConversationId::from("c"), "Brahms");

        let response = chain.call(request.clone()).await.unwrap();

        assert_eq!(response, terminal.respond(request).await.unwrap());
        assert_eq!(LoggingAdvisor.order(), i32::MAX);
    }
}
