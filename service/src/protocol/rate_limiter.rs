//! Fixed-window request limiter keyed by (subject, network origin).
//!
//! Each key gets a counter that resets once `window_ms` has elapsed since the
//! window opened. Two subjects behind one origin get independent budgets; a
//! subject spread across origins is bounded per origin.

use std::fmt;

use dashmap::DashMap;

use super::ms_to_i64;

/// Subject used for requests without an authenticated identity.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Default budget: 5 requests per 60-second window.
pub const DEFAULT_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Anonymous callers are `subject: None`, never a sentinel string, so a
/// subject literally named `anonymous` keeps its own budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    subject: Option<String>,
    origin: String,
}

impl RateKey {
    #[must_use]
    pub fn new(subject: Option<&str>, origin: &str) -> Self {
        Self {
            subject: subject.map(str::to_string),
            origin: origin.to_string(),
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "sub:{subject}@{}", self.origin),
            None => write!(f, "{ANONYMOUS_SUBJECT}@{}", self.origin),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindowEntry {
    count: u32,
    window_start: i64,
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<RateKey, RateWindowEntry>,
    max_requests: u32,
    window_ms: i64,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window_ms: ms_to_i64(window_ms),
        }
    }

    /// Count a request against `key` and report whether it fits the current window.
    ///
    /// The check and the increment happen under the key's shard lock, so
    /// concurrent requests for one key cannot both take the last slot.
    pub fn allow(&self, key: &RateKey, now_ms: i64) -> bool {
        let mut entry = self
            .windows
            .entry(key.clone())
            .or_insert(RateWindowEntry {
                count: 0,
                window_start: now_ms,
            });

        if now_ms.saturating_sub(entry.window_start) >= self.window_ms {
            entry.count = 0;
            entry.window_start = now_ms;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, entry| {
            let keep = now_ms.saturating_sub(entry.window_start) < self.window_ms;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS)
    }
}
