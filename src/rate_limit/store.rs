//! Per-client fixed-window counters.
//!
//! Every client key maps to one counter record holding the number of
//! requests admitted since its window started. The whole map sits behind a
//! single lock, and the check-and-increment for a key runs entirely under it.
//!
//! # Example
//!
//! ```rust
//! use admission_gate::rate_limit::ClientCounterStore;
//!
//! # tokio_test::block_on(async {
//! let store = ClientCounterStore::new();
//!
//! assert!(store.try_admit("10.0.0.1", 2).await);
//! assert!(store.try_admit("10.0.0.1", 2).await);
//! assert!(!store.try_admit("10.0.0.1", 2).await);
//!
//! // Other clients have their own counter
//! assert!(store.try_admit("10.0.0.2", 2).await);
//! # });
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::rate_limit::limits;

/// Admission state for a single client.
#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    /// Requests admitted in the current window, always at least 1
    count: u32,
    /// When the current window began
    window_start: Instant,
}

impl CounterRecord {
    fn new(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }

    /// Fixed-window admission check. A rejected check leaves the record untouched.
    fn try_admit(&mut self, now: Instant, window: Duration, limit: u32) -> bool {
        if self.is_expired(now, window) {
            *self = Self::new(now);
            true
        } else if self.count >= limit {
            false
        } else {
            self.count += 1;
            true
        }
    }
}

/// Concurrency-safe map from client key to its fixed-window counter.
///
/// Records are created lazily on first sight of a key and are never evicted
/// unless [`sweep_expired`](Self::sweep_expired) is called. Callers only ever
/// see boolean verdicts; the records themselves stay inside the store.
#[derive(Debug)]
pub struct ClientCounterStore {
    records: Mutex<HashMap<String, CounterRecord>>,
    window: Duration,
}

impl ClientCounterStore {
    /// Create a store with the default one-minute window.
    pub fn new() -> Self {
        Self::with_window(limits::WINDOW)
    }

    /// Create a store with a custom window length.
    pub fn with_window(window: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to admit one request for `key` against `limit` requests per window.
    ///
    /// 1. Unknown key: record created with a count of 1, admitted.
    /// 2. Window elapsed since the last reset: count reset to 1, admitted.
    /// 3. Count already at `limit`: rejected, record unchanged.
    /// 4. Otherwise the count is incremented and the request admitted.
    ///
    /// A `limit` of zero admits only the request that creates (or resets) the record.
    pub async fn try_admit(&self, key: &str, limit: u32) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock().await;

        match records.get_mut(key) {
            Some(record) => record.try_admit(now, self.window, limit),
            None => {
                records.insert(key.to_owned(), CounterRecord::new(now));
                true
            }
        }
    }

    /// Remove records whose window has already elapsed.
    ///
    /// Returns the number of records removed. Removing an expired record has
    /// no effect on admission: the next request for that key starts a fresh
    /// window either way.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.window;
        let mut records = self.records.lock().await;

        let before = records.len();
        records.retain(|_, record| !record.is_expired(now, window));
        before - records.len()
    }

    /// Get the number of client keys being tracked, including expired ones.
    pub async fn tracked_clients(&self) -> usize {
        self.records.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn count(&self, key: &str) -> Option<u32> {
        self.records.lock().await.get(key).map(|record| record.count)
    }
}

impl Default for ClientCounterStore {
    fn default() -> Self {
        Self::new()
    }
}
