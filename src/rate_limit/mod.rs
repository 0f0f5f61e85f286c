//! Per-client admission control.
//!
//! Each client, identified by its network address, may have a fixed number of
//! requests admitted per window. Requests over the limit are not refused
//! straight away: they back off with exponentially growing waits and retry,
//! and are only rejected once the retry budget runs out.
//!
//! ## Components
//!
//! - [`backoff`]: maps a retry attempt to a wait duration
//! - [`ClientCounterStore`]: fixed-window counters for every client behind one lock
//! - [`AdmissionController`]: retries store checks with backoff until a [`Verdict`]
//!   is reached or the caller cancels
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use admission_gate::rate_limit::{AdmissionController, RateLimitConfig, Verdict};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let config = RateLimitConfig::builder()
//!     .max_requests_per_window(2)
//!     .max_backoff(Duration::from_millis(4))
//!     .base_delay(Duration::from_millis(1))
//!     .build();
//!
//! let controller = AdmissionController::new(&config);
//! let cancel = CancellationToken::new();
//! let limit = config.max_requests_per_window;
//!
//! assert_eq!(controller.admit("10.0.0.1", limit, &cancel).await, Some(Verdict::Admitted));
//! assert_eq!(controller.admit("10.0.0.1", limit, &cancel).await, Some(Verdict::Admitted));
//! assert_eq!(controller.admit("10.0.0.1", limit, &cancel).await, Some(Verdict::Rejected));
//! # });
//! ```

mod backoff;
mod controller;
mod store;

pub use backoff::{backoff, backoff_with_base};
pub use controller::{AdmissionController, RetryPolicy, Verdict};
pub use store::ClientCounterStore;

use std::time::Duration;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admissions per window for each client.
    pub max_requests_per_window: u32,
    /// Length of the fixed window.
    pub window: Duration,
    /// Reject once the retry attempt counter exceeds this value.
    pub max_retries: u32,
    /// Reject instead of waiting once the next backoff delay reaches this value.
    pub max_backoff: Duration,
    /// Unit delay the backoff schedule is scaled by.
    pub base_delay: Duration,
    /// How often to drop expired client records (None = never).
    pub sweep_interval: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: limits::MAX_REQUESTS_PER_WINDOW,
            window: limits::WINDOW,
            max_retries: limits::MAX_RETRIES,
            max_backoff: limits::MAX_BACKOFF,
            base_delay: limits::BASE_DELAY,
            sweep_interval: None,
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Retry policy for the admission controller.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_backoff: self.max_backoff,
            base_delay: self.base_delay,
        }
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Debug, Clone, Default)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
        }
    }

    /// Set the maximum admissions per window for each client.
    pub fn max_requests_per_window(mut self, limit: u32) -> Self {
        self.config.max_requests_per_window = limit;
        self
    }

    /// Set the window length.
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set the retry attempt ceiling.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the backoff escalation cap.
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.config.max_backoff = max;
        self
    }

    /// Set the backoff unit delay.
    pub fn base_delay(mut self, base: Duration) -> Self {
        self.config.base_delay = base;
        self
    }

    /// Enable periodic removal of expired client records.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = Some(interval);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RateLimitConfig {
        self.config
    }
}

/// Default rate limit constants.
pub mod limits {
    use std::time::Duration;

    /// Admissions per window for each client.
    pub const MAX_REQUESTS_PER_WINDOW: u32 = 10;
    /// Fixed window length.
    pub const WINDOW: Duration = Duration::from_secs(60);
    /// Retry attempt ceiling.
    pub const MAX_RETRIES: u32 = 10;
    /// Backoff escalation cap.
    pub const MAX_BACKOFF: Duration = Duration::from_secs(10);
    /// Backoff unit delay.
    pub const BASE_DELAY: Duration = Duration::from_secs(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = RateLimitConfig::builder()
            .max_requests_per_window(3)
            .window(Duration::from_secs(5))
            .sweep_interval(Duration::from_secs(30))
            .build();

        assert_eq!(config.max_requests_per_window, 3);
        assert_eq!(config.window, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }
}
