//! Client-facing rejection bodies.
//!
//! Messages are drawn at random from a small pool so that responses do not
//! reveal which check failed beyond the status code.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::protocol::RejectReason;

const MESSAGES: &[&str] = &[
    "Request could not be processed",
    "Payment request rejected",
    "Unable to complete this request",
    "The request was blocked",
    "This request is not allowed",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub error: String,
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_logged: Option<bool>,
}

impl RejectionBody {
    #[must_use]
    pub fn for_reason(reason: RejectReason) -> Self {
        let attack_type = reason.attack_type();
        let flagged = attack_type.is_some().then_some(true);
        Self {
            error: random_message().to_string(),
            blocked: true,
            attack_type: attack_type.map(str::to_string),
            reported: flagged,
            ip_logged: flagged,
        }
    }
}

fn random_message() -> &'static str {
    MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Request rejected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_body_is_flagged() {
        let body = serde_json::to_value(RejectionBody::for_reason(RejectReason::ReplayDetected))
            .expect("serialize");
        assert_eq!(body["blocked"], true);
        assert_eq!(body["attackType"], "replay");
        assert_eq!(body["reported"], true);
        assert_eq!(body["ipLogged"], true);
        assert!(MESSAGES.contains(&body["error"].as_str().expect("message")));
    }

    #[test]
    fn tampering_body_is_flagged() {
        for reason in [
            RejectReason::DecryptionFailure,
            RejectReason::SignatureMismatch,
        ] {
            let body = RejectionBody::for_reason(reason);
            assert_eq!(body.attack_type.as_deref(), Some("tampering"));
            assert_eq!(body.reported, Some(true));
        }
    }

    #[test]
    fn plain_rejection_omits_attack_fields() {
        let body = serde_json::to_value(RejectionBody::for_reason(RejectReason::Expired))
            .expect("serialize");
        let obj = body.as_object().expect("object");
        assert_eq!(obj.len(), 2);
        assert_eq!(body["blocked"], true);
    }
}
