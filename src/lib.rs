//! # Admission Gate
//!
//! Per-client admission control for request/response services.
//!
//! Each client, identified by its network address, may have a fixed number of
//! requests admitted per one-minute window. Bursts over the limit are delayed
//! with exponential backoff and retried rather than refused immediately; a
//! request is only rejected once its retry budget is spent.
//!
//! ## Features
//!
//! - Fixed-window counters per client behind a single lock
//! - Exponential backoff retries with a configurable ceiling and escalation cap
//! - Cancellation of pending retries when the client disconnects
//! - An axum HTTP gateway answering `200` or `429` with JSON bodies
//!
//! ## Quick Start
//!
//! ```rust
//! use admission_gate::rate_limit::{AdmissionController, RateLimitConfig, Verdict};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let controller = AdmissionController::new(&RateLimitConfig::default());
//! let cancel = CancellationToken::new();
//!
//! match controller.admit("203.0.113.9", 10, &cancel).await {
//!     Some(Verdict::Admitted) => println!("admitted"),
//!     Some(Verdict::Rejected) => println!("too many requests"),
//!     None => println!("client went away"),
//! }
//! # });
//! ```

pub mod error;
pub mod gateway;
pub mod rate_limit;

// Re-export commonly used types at crate root
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayConfig};
pub use rate_limit::{AdmissionController, RateLimitConfig, Verdict};

/// Result type alias using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
