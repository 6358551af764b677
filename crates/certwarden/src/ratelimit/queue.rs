//! Dispatch queue
//!
//! Callers hand the queue a unit of work; the queue waits until the budget
//! grants a token and then runs the work exactly once. Waiters in this
//! process are served in arrival order through a fair mutex. Across
//! processes, order is whatever the shared budget store grants.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use certwarden_config::DispatchConfig;

use super::RateBudget;

/// Pacing of token acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Shortest sleep between attempts
    pub min_poll: Duration,
    /// Longest sleep between attempts
    pub max_poll: Duration,
    /// Sleep after the budget store fails
    pub error_backoff: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            min_poll: config.min_poll(),
            max_poll: config.max_poll(),
            error_backoff: config.error_backoff(),
        }
    }
}

impl DispatchSettings {
    fn poll_delay(&self, retry_after: Duration) -> Duration {
        retry_after.clamp(self.min_poll, self.max_poll.max(self.min_poll))
    }
}

/// Acquire-then-invoke gate in front of the issuance budget.
#[derive(Debug)]
pub struct DispatchQueue {
    budget: RateBudget,
    settings: DispatchSettings,
    /// Held by the waiter currently polling the budget. Tokio's mutex is
    /// FIFO-fair, which gives local waiters their arrival order.
    turnstile: Mutex<()>,
    waiting: AtomicUsize,
}

impl DispatchQueue {
    pub fn new(budget: RateBudget, settings: DispatchSettings) -> Self {
        Self {
            budget,
            settings,
            turnstile: Mutex::new(()),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Requests waiting for a token in this process.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Wait for a token, then run `handler` once and return its output.
    ///
    /// Waits indefinitely. Budget store failures are logged and retried.
    pub async fn request<F, Fut, T>(&self, handler: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        handler().await
    }

    async fn acquire(&self) {
        let _waiting = WaitingGuard::enter(&self.waiting);
        let _turn = self.turnstile.lock().await;

        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match self.budget.consume().await {
                Ok(outcome) if outcome.is_admitted() => {
                    debug!(key = %self.budget.key(), attempts, "Dispatch token acquired");
                    break;
                }
                Ok(outcome) => {
                    let delay = self.settings.poll_delay(outcome.retry_after());
                    trace!(
                        key = %self.budget.key(),
                        retry_after_ms = outcome.retry_after().as_millis() as u64,
                        sleep_ms = delay.as_millis() as u64,
                        "Budget exhausted, waiting"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        key = %self.budget.key(),
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs(),
                        "Budget store error, retrying"
                    );
                    tokio::time::sleep(self.settings.error_backoff).await;
                }
            }
        }
    }
}

/// Counts one waiter until dropped, including when the request is cancelled.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
