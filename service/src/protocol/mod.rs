//! Payment-request protocol defences
//!
//! The request path runs: rate limiter → validation pipeline (field checks,
//! nonce match, replay lookup, freshness, decrypt, signature, subject
//! binding, nonce claim) → suspicious-activity tracker. The three shared
//! registries (nonce ledger, rate windows, activity windows) are sharded
//! concurrent maps and are swept by an independent timer task.

pub mod activity;
pub mod clock;
pub mod error;
pub mod freshness;
pub mod nonce_ledger;
pub mod pipeline;
pub mod rate_limiter;
pub mod sweeper;

use serde::{Deserialize, Serialize};

pub use activity::{ActivityKey, ActivityTracker, ActivityVerdict};
pub use clock::{Clock, SystemClock};
pub use error::{RejectReason, Rejection, Stage};
pub use freshness::is_fresh;
pub use nonce_ledger::{NonceLedger, NonceRecord, MAX_NONCE_LENGTH};
pub use pipeline::{InboundRequest, RawEnvelope, RequestValidator, SignatureHeaders, ValidatedRequest};
pub use rate_limiter::{FixedWindowLimiter, RateKey, ANONYMOUS_SUBJECT};
pub use sweeper::{spawn_sweeper, sweep_once, Registries, SweepReport};

/// When a nonce claimed by a verified request becomes permanently consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceCommit {
    /// The claim made right after signature verification is final. A request
    /// that later fails downstream has still spent its nonce.
    #[default]
    AfterVerification,
    /// The claim is a reservation, released if anything after verification
    /// fails, so only a fully committed order consumes the nonce.
    AfterDownstream,
}

/// Convert a millisecond setting to the signed clock domain, saturating.
pub(crate) fn ms_to_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
