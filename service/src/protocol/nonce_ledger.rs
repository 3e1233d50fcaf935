//! In-memory nonce ledger for replay prevention.
//!
//! A nonce is claimed once a request has been fully verified and is remembered
//! for the retention horizon. Eviction happens only in [`NonceLedger::sweep`],
//! which the background sweeper drives on a fixed period.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::ms_to_i64;

/// Maximum nonce length to prevent memory abuse.
pub const MAX_NONCE_LENGTH: usize = 64;

/// Default retention: five minutes, ten times the freshness tolerance.
pub const DEFAULT_RETENTION_MS: u64 = 300_000;

/// When a nonce was first accepted. Never updated after insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRecord {
    pub first_seen_at: i64,
}

/// Sharded registry of consumed nonces.
#[derive(Debug)]
pub struct NonceLedger {
    seen: DashMap<String, NonceRecord>,
    retention_ms: i64,
}

impl NonceLedger {
    #[must_use]
    pub fn new(retention_ms: u64) -> Self {
        Self {
            seen: DashMap::new(),
            retention_ms: ms_to_i64(retention_ms),
        }
    }

    /// Whether `nonce` is currently held by the ledger.
    #[must_use]
    pub fn has_seen(&self, nonce: &str) -> bool {
        self.seen.contains_key(nonce)
    }

    /// Record `nonce` as seen at `now_ms`. No-op if already present.
    pub fn record(&self, nonce: &str, now_ms: i64) {
        self.seen
            .entry(nonce.to_string())
            .or_insert(NonceRecord {
                first_seen_at: now_ms,
            });
    }

    /// Atomically insert `nonce` if absent. Returns `true` if this call
    /// inserted it, `false` if another request already holds it.
    ///
    /// This is the single point that decides which of two concurrent requests
    /// carrying the same nonce wins.
    pub fn claim(&self, nonce: &str, now_ms: i64) -> bool {
        match self.seen.entry(nonce.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(NonceRecord {
                    first_seen_at: now_ms,
                });
                true
            }
        }
    }

    /// Drop a claim. Only used when a reservation must be handed back.
    pub fn release(&self, nonce: &str) -> bool {
        self.seen.remove(nonce).is_some()
    }

    /// Remove entries older than the retention horizon. Returns how many were removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let mut removed = 0;
        self.seen.retain(|_, record| {
            let keep = now_ms.saturating_sub(record.first_seen_at) <= self.retention_ms;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for NonceLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_MS)
    }
}
