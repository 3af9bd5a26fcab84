//! Background task runner.
//!
//! Work submitted here runs on its own tokio task, bounded by a semaphore so
//! a burst of turns cannot flood the advisor model. Errors and panics stop
//! at this boundary: they are logged and the handle resolves to `None`.
//! Work a turn is blocked on takes a separate, unlimited path.

use futures::FutureExt;
use maestro_core::Result;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, warn};

struct Shared {
    permits: Arc<Semaphore>,
    pending: AtomicUsize,
    idle: Notify,
}

/// Spawns isolated background work.
///
/// Cheap to clone; clones share the concurrency limit and pending count.
#[derive(Clone)]
pub struct TaskRunner {
    shared: Arc<Shared>,
}

impl TaskRunner {
    /// `max_concurrency` is clamped to at least one.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Submit `work`. Must be called from within a tokio runtime.
    ///
    /// The caller may drop the handle to fire and forget, or await it.
    pub fn spawn<T, F>(&self, label: &'static str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.launch(label, true, work)
    }

    /// Submit work a turn is waiting on.
    ///
    /// Skips the concurrency limit, so its latency depends only on the work
    /// itself and never on other turns' background tasks. Errors and panics
    /// are isolated as in [`spawn`](Self::spawn).
    pub fn spawn_awaited<T, F>(&self, label: &'static str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.launch(label, false, work)
    }

    fn launch<T, F>(&self, label: &'static str, bounded: bool, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);

        let join = tokio::spawn(async move {
            let _pending = PendingGuard(Arc::clone(&shared));
            let _permit = if bounded {
                match Arc::clone(&shared.permits).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        error!(task = label, "Background runner closed, dropping task");
                        return None;
                    }
                }
            } else {
                None
            };

            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(value)) => {
                    debug!(task = label, "Background task finished");
                    Some(value)
                }
                Ok(Err(e)) => {
                    error!(task = label, error = %e, "Background task failed");
                    None
                }
                Err(panic) => {
                    error!(task = label, panic = %panic_message(&*panic), "Background task panicked");
                    None
                }
            }
        });

        TaskHandle { join }
    }

    /// Tasks submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Wait until no submitted task is still running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(4)
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("pending", &self.pending())
            .field("available_permits", &self.shared.permits.available_permits())
            .finish()
    }
}

struct PendingGuard(Arc<Shared>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// The eventual outcome of a background task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Option<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task. `None` if it failed, panicked, or was aborted.
    pub async fn outcome(self) -> Option<T> {
        settle(self.join.await)
    }

    /// Wait at most `limit`; past that the task is aborted and `None` returned.
    ///
    /// An aborted task stops at its next suspension point and produces nothing.
    pub async fn outcome_within(mut self, limit: Duration) -> Option<T> {
        match tokio::time::timeout(limit, &mut self.join).await {
            Ok(joined) => settle(joined),
            Err(_) => {
                self.join.abort();
                warn!(limit_ms = limit.as_millis() as u64, "Background task too slow, aborted");
                None
            }
        }
    }
}

fn settle<T>(joined: std::result::Result<Option<T>, JoinError>) -> Option<T> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Background task did not complete");
            None
        }
    }
}
