//! Suspicious-activity tracker: a sliding-window event counter per key.
//!
//! Stacked after the rate limiter: the limiter caps throughput per minute,
//! the tracker catches sustained traffic that stays just under that cap for
//! many windows. A block lasts only until enough events age out.

use std::collections::VecDeque;
use std::fmt;

use dashmap::DashMap;

use super::ms_to_i64;

/// Default: more than 10 events within 5 minutes blocks the key.
pub const DEFAULT_THRESHOLD: usize = 10;
pub const DEFAULT_WINDOW_MS: u64 = 300_000;

/// Who an event is charged to. Subjects and origins live in separate
/// namespaces, so a subject id that looks like an address never shares a
/// bucket with that address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityKey {
    Subject(String),
    Origin(String),
}

impl ActivityKey {
    /// The authenticated subject if there is one, otherwise the origin.
    #[must_use]
    pub fn for_request(subject: Option<&str>, origin: &str) -> Self {
        subject.map_or_else(
            || Self::Origin(origin.to_string()),
            |id| Self::Subject(id.to_string()),
        )
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject(id) => write!(f, "sub:{id}"),
            Self::Origin(origin) => write!(f, "ip:{origin}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityVerdict {
    Allowed,
    Blocked,
}

#[derive(Debug)]
pub struct ActivityTracker {
    events: DashMap<ActivityKey, VecDeque<i64>>,
    threshold: usize,
    window_ms: i64,
}

impl ActivityTracker {
    #[must_use]
    pub fn new(threshold: usize, window_ms: u64) -> Self {
        Self {
            events: DashMap::new(),
            threshold,
            window_ms: ms_to_i64(window_ms),
        }
    }

    /// Prune `key`'s events to the trailing window, record `now_ms`, and
    /// block if the window now holds more than the threshold.
    pub fn record_and_check(&self, key: &ActivityKey, now_ms: i64) -> ActivityVerdict {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        let mut events = self.events.entry(key.clone()).or_default();

        events.retain(|&ts| ts > cutoff);
        events.push_back(now_ms);

        // Only the newest threshold + 1 events can decide a verdict.
        while events.len() > self.threshold.saturating_add(1) {
            events.pop_front();
        }

        if events.len() > self.threshold {
            ActivityVerdict::Blocked
        } else {
            ActivityVerdict::Allowed
        }
    }

    /// Events currently held for `key` (not pruned).
    #[must_use]
    pub fn count(&self, key: &ActivityKey) -> usize {
        self.events.get(key).map_or(0, |events| events.len())
    }

    /// Prune every key and drop keys with no events left in the window.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        let mut removed = 0;
        self.events.retain(|_, events| {
            events.retain(|&ts| ts > cutoff);
            let keep = !events.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_WINDOW_MS)
    }
}
