//! Admission with exponential backoff retries.
//!
//! [`AdmissionController::admit`] keeps re-checking the counter store for a
//! client, sleeping between attempts, until the request is admitted, the retry
//! budget runs out, or the caller cancels.
//!
//! # Sequencing
//!
//! With the default policy an over-limit request is checked, then waits
//! `backoff(0)`. After every wait the attempt counter `n` is incremented and
//! the *next* delay `backoff(n)` is compared against `max_backoff` before the
//! store is checked again: once that delay reaches the cap the request is
//! rejected without waiting. The default schedule therefore waits
//! 1, 1, 2, 2, 4, 4, 8, 8 seconds (30 seconds in total) before giving up.
//!
//! # Example
//!
//! ```rust
//! use admission_gate::rate_limit::{AdmissionController, RateLimitConfig, Verdict};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let controller = AdmissionController::new(&RateLimitConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let verdict = controller.admit("10.0.0.1", 10, &cancel).await;
//! assert_eq!(verdict, Some(Verdict::Admitted));
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::rate_limit::{ClientCounterStore, RateLimitConfig, backoff_with_base, limits};

/// Terminal outcome of an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The request may proceed.
    Admitted,
    /// The client is over its limit and the retry budget is spent.
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Admitted => write!(f, "admitted"),
            Verdict::Rejected => write!(f, "rejected"),
        }
    }
}

/// Retry limits applied after a rejected admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reject once the attempt counter exceeds this value.
    pub max_retries: u32,
    /// Reject instead of waiting once the next delay reaches this value.
    pub max_backoff: Duration,
    /// Unit delay the backoff schedule is scaled by.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay for the given attempt under this policy.
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff_with_base(attempt, self.base_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: limits::MAX_RETRIES,
            max_backoff: limits::MAX_BACKOFF,
            base_delay: limits::BASE_DELAY,
        }
    }
}

/// Result of a backoff wait raced against cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// The timer lives inside this future, so it is released on either outcome
/// and no waiter outlives the retry it belongs to.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> WaitOutcome {
    tokio::select! {
        biased;
        () = cancel.cancelled() => WaitOutcome::Cancelled,
        () = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
    }
}

/// Drives admission checks against a shared [`ClientCounterStore`].
///
/// Cloning is cheap and every clone shares the same store.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    store: Arc<ClientCounterStore>,
    policy: RetryPolicy,
}

impl AdmissionController {
    /// Create a controller with a fresh store built from `config`.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_store(
            Arc::new(ClientCounterStore::with_window(config.window)),
            config.retry_policy(),
        )
    }

    /// Create a controller over an existing store.
    pub fn with_store(store: Arc<ClientCounterStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<ClientCounterStore> {
        &self.store
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Admit one request for `key`, retrying with backoff while it is over `limit`.
    ///
    /// Returns `None` if `cancel` fires during a backoff wait. An abandoned
    /// admission produces no verdict and never touches the store again.
    /// The store lock is only held for each individual check, never across a wait.
    pub async fn admit(
        &self,
        key: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Option<Verdict> {
        let mut attempt: u32 = 0;

        loop {
            if self.store.try_admit(key, limit).await {
                return Some(Verdict::Admitted);
            }

            if attempt > self.policy.max_retries {
                tracing::info!(client = %key, attempt, "retry budget exhausted, rejecting");
                return Some(Verdict::Rejected);
            }

            let wait = self.policy.delay(attempt);
            tracing::debug!(client = %key, attempt, ?wait, "over limit, backing off");

            if wait_or_cancel(wait, cancel).await == WaitOutcome::Cancelled {
                tracing::debug!(client = %key, attempt, "admission abandoned");
                return None;
            }

            attempt += 1;
            if self.policy.delay(attempt) >= self.policy.max_backoff {
                tracing::info!(client = %key, attempt, "backoff cap reached, rejecting");
                return Some(Verdict::Rejected);
            }
        }
    }
}
