//! Retry delay schedule.
//!
//! The delay doubles every second attempt: attempts `0` and `1` wait one base
//! unit, `2` and `3` wait two, `4` and `5` wait four, and so on.
//!
//! ```rust
//! use std::time::Duration;
//! use admission_gate::rate_limit::backoff;
//!
//! assert_eq!(backoff(0), Duration::from_secs(1));
//! assert_eq!(backoff(3), Duration::from_secs(2));
//! assert_eq!(backoff(6), Duration::from_secs(8));
//! ```

use std::time::Duration;

/// Delay before retry `attempt`, in whole seconds: `2^floor(attempt / 2)`.
pub fn backoff(attempt: u32) -> Duration {
    backoff_with_base(attempt, Duration::from_secs(1))
}

/// Delay before retry `attempt`, scaled by `base`: `base * 2^floor(attempt / 2)`.
///
/// The multiplier saturates at `u32::MAX` for very large attempts, so the
/// function is total and never decreases.
pub fn backoff_with_base(attempt: u32, base: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt / 2).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
