//! Bounded re-attempts with a fixed backoff.
//!
//! Used around every advisor side-call to the (often small, local) advisor
//! model. A rejected answer is reported by the operation as an `Err`, most
//! often [`ProviderError::MalformedOutput`], and is retried like any other
//! failure.

use maestro_config::RetryConfig;
use maestro_core::error::{Error, ProviderError};
use maestro_core::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Up to `max_attempts` tries, `backoff` apart, no jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            attempt_timeout: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Give up on a single attempt after `timeout`; counts as a failed attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Longest time [`execute`](Self::execute) can take, if attempts are bounded.
    ///
    /// `None` when attempts have no timeout or the total does not fit a `Duration`.
    pub fn worst_case_duration(&self) -> Option<Duration> {
        let attempts = self.attempt_timeout?.checked_mul(self.max_attempts)?;
        let waits = self.backoff.checked_mul(self.max_attempts - 1)?;
        attempts.checked_add(waits)
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// Returns the first success, or the error of the final attempt.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::Provider(ProviderError::Timeout(format!(
                        "{label} attempt exceeded {}ms",
                        limit.as_millis()
                    )))),
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying in {}ms",
                        self.backoff.as_millis()
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
