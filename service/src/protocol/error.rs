use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

/// Why a payment request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("malformed request")]
    MalformedRequest,
    #[error("header nonce does not match envelope nonce")]
    NonceMismatch,
    #[error("nonce has already been used")]
    ReplayDetected,
    #[error("request timestamp outside the freshness window")]
    Expired,
    #[error("envelope could not be decrypted")]
    DecryptionFailure,
    #[error("signature does not match payload")]
    SignatureMismatch,
    #[error("payload subject does not match authenticated identity")]
    IdentityMismatch,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("blocked for suspicious activity")]
    SuspiciousActivityBlocked,
    #[error("downstream order creation failed")]
    DownstreamFailure,
}

impl RejectReason {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MalformedRequest | Self::NonceMismatch | Self::Expired => {
                StatusCode::BAD_REQUEST
            }
            Self::DecryptionFailure | Self::SignatureMismatch | Self::IdentityMismatch => {
                StatusCode::UNAUTHORIZED
            }
            Self::ReplayDetected => StatusCode::FORBIDDEN,
            Self::RateLimited | Self::SuspiciousActivityBlocked => StatusCode::TOO_MANY_REQUESTS,
            Self::DownstreamFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attack category reported to the client, if this rejection is one.
    #[must_use]
    pub const fn attack_type(self) -> Option<&'static str> {
        match self {
            Self::ReplayDetected => Some("replay"),
            Self::DecryptionFailure | Self::SignatureMismatch => Some("tampering"),
            _ => None,
        }
    }

    /// Only downstream failures may be retried, and only with a fresh envelope.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::DownstreamFailure)
    }

    /// Short machine-readable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::NonceMismatch => "nonce_mismatch",
            Self::ReplayDetected => "replay_detected",
            Self::Expired => "expired",
            Self::DecryptionFailure => "decryption_failure",
            Self::SignatureMismatch => "signature_mismatch",
            Self::IdentityMismatch => "identity_mismatch",
            Self::RateLimited => "rate_limited",
            Self::SuspiciousActivityBlocked => "suspicious_activity_blocked",
            Self::DownstreamFailure => "downstream_failure",
        }
    }
}

/// Progress through request handling. Ordered: a later variant means more
/// checks have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    FieldsChecked,
    NonceMatched,
    NonceUnused,
    Fresh,
    Decrypted,
    SignatureVerified,
    Committed,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::FieldsChecked => "fields_checked",
            Self::NonceMatched => "nonce_matched",
            Self::NonceUnused => "nonce_unused",
            Self::Fresh => "fresh",
            Self::Decrypted => "decrypted",
            Self::SignatureVerified => "signature_verified",
            Self::Committed => "committed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal `Rejected` state: the reason and the last stage that passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{reason} (after {stage})")]
pub struct Rejection {
    pub reason: RejectReason,
    pub stage: Stage,
}

impl Rejection {
    #[must_use]
    pub const fn new(reason: RejectReason, stage: Stage) -> Self {
        Self { reason, stage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (RejectReason::MalformedRequest, 400),
            (RejectReason::NonceMismatch, 400),
            (RejectReason::Expired, 400),
            (RejectReason::DecryptionFailure, 401),
            (RejectReason::SignatureMismatch, 401),
            (RejectReason::IdentityMismatch, 401),
            (RejectReason::ReplayDetected, 403),
            (RejectReason::RateLimited, 429),
            (RejectReason::SuspiciousActivityBlocked, 429),
            (RejectReason::DownstreamFailure, 500),
        ];
        for (reason, code) in cases {
            assert_eq!(reason.status().as_u16(), code, "{reason:?}");
        }
    }

    #[test]
    fn attack_types() {
        assert_eq!(RejectReason::ReplayDetected.attack_type(), Some("replay"));
        assert_eq!(
            RejectReason::DecryptionFailure.attack_type(),
            Some("tampering")
        );
        assert_eq!(
            RejectReason::SignatureMismatch.attack_type(),
            Some("tampering")
        );
        assert_eq!(RejectReason::Expired.attack_type(), None);
        assert_eq!(RejectReason::RateLimited.attack_type(), None);
    }

    #[test]
    fn only_downstream_is_retryable() {
        assert!(RejectReason::DownstreamFailure.is_retryable());
        assert!(!RejectReason::ReplayDetected.is_retryable());
        assert!(!RejectReason::RateLimited.is_retryable());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Received < Stage::NonceMatched);
        assert!(Stage::Fresh < Stage::Decrypted);
        assert!(Stage::SignatureVerified < Stage::Committed);
    }

    #[test]
    fn rejection_display() {
        let r = Rejection::new(RejectReason::Expired, Stage::NonceUnused);
        assert_eq!(
            r.to_string(),
            "request timestamp outside the freshness window (after nonce_unused)"
        );
    }
}
