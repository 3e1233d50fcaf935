//! Request validation pipeline.
//!
//! Checks run in a fixed order so that cheap, attacker-controlled checks
//! short-circuit before any cryptographic work:
//!
//! ```text
//! Received → FieldsChecked → NonceMatched → NonceUnused → Fresh
//!          → Decrypted → SignatureVerified → Committed
//! ```
//!
//! A rejection carries the last [`Stage`] that passed.

use std::sync::Arc;

use payguard_crypto::{
    decode_base64, decrypt_intent, verify, EncryptionKey, OrderIntent, SealedRequest,
    SigningSecret,
};
use serde::Deserialize;
use serde_json::Value;

use super::clock::Clock;
use super::error::{RejectReason, Rejection, Stage};
use super::freshness::is_fresh;
use super::nonce_ledger::{NonceLedger, MAX_NONCE_LENGTH};

/// Request body as received. Every field is optional so that a missing field
/// surfaces as a protocol rejection rather than a framework error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEnvelope {
    pub encrypted: Option<String>,
    pub iv: Option<String>,
    pub nonce: Option<String>,
    pub timestamp: Option<i64>,
}

/// Values of the `X-Signature`, `X-Nonce` and `X-Timestamp` headers.
#[derive(Debug, Clone, Default)]
pub struct SignatureHeaders {
    pub signature: Option<String>,
    pub nonce: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub body: RawEnvelope,
    pub headers: SignatureHeaders,
}

impl From<&SealedRequest> for InboundRequest {
    fn from(sealed: &SealedRequest) -> Self {
        Self {
            body: RawEnvelope {
                encrypted: Some(sealed.envelope.encrypted.clone()),
                iv: Some(sealed.envelope.iv.clone()),
                nonce: Some(sealed.envelope.nonce.clone()),
                timestamp: Some(sealed.envelope.timestamp),
            },
            headers: SignatureHeaders {
                signature: Some(sealed.signature.clone()),
                nonce: Some(sealed.nonce.clone()),
                timestamp: Some(sealed.timestamp.to_string()),
            },
        }
    }
}

/// A request that passed every check. Its nonce is now held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub intent: OrderIntent,
    pub nonce: String,
    pub client_timestamp: i64,
}

/// Fields extracted by the presence check.
struct Fields<'a> {
    encrypted: &'a str,
    iv: &'a str,
    nonce: &'a str,
    header_nonce: &'a str,
    signature: &'a str,
    timestamp: i64,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

#[derive(Debug)]
pub struct RequestValidator {
    key: EncryptionKey,
    secret: SigningSecret,
    ledger: Arc<NonceLedger>,
    clock: Arc<dyn Clock>,
    tolerance_ms: u64,
}

impl RequestValidator {
    #[must_use]
    pub fn new(
        key: EncryptionKey,
        secret: SigningSecret,
        ledger: Arc<NonceLedger>,
        clock: Arc<dyn Clock>,
        tolerance_ms: u64,
    ) -> Self {
        Self {
            key,
            secret,
            ledger,
            clock,
            tolerance_ms,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<NonceLedger> {
        &self.ledger
    }

    /// Run the pipeline. On success the nonce has been claimed in the ledger.
    ///
    /// `expected_subject` is the authenticated subject, if any; the decrypted
    /// intent must name the same subject.
    ///
    /// # Errors
    /// Returns the first failing check as a [`Rejection`].
    pub fn validate(
        &self,
        request: &InboundRequest,
        expected_subject: Option<&str>,
    ) -> Result<ValidatedRequest, Rejection> {
        let reject = |reason, stage| Err(Rejection::new(reason, stage));
        let now = self.clock.now_ms();

        let Some(fields) = Self::check_fields(request) else {
            return reject(RejectReason::MalformedRequest, Stage::Received);
        };

        if fields.header_nonce != fields.nonce {
            return reject(RejectReason::NonceMismatch, Stage::FieldsChecked);
        }

        if self.ledger.has_seen(fields.nonce) {
            return reject(RejectReason::ReplayDetected, Stage::NonceMatched);
        }

        if !is_fresh(fields.timestamp, now, self.tolerance_ms) {
            return reject(RejectReason::Expired, Stage::NonceUnused);
        }

        let Some(payload) = self.decrypt(fields.encrypted, fields.iv) else {
            return reject(RejectReason::DecryptionFailure, Stage::Fresh);
        };

        if !verify(&payload, fields.nonce, fields.signature, &self.secret) {
            return reject(RejectReason::SignatureMismatch, Stage::Decrypted);
        }

        // Authentic but not an order intent.
        let Ok(intent) = serde_json::from_value::<OrderIntent>(payload) else {
            return reject(RejectReason::MalformedRequest, Stage::SignatureVerified);
        };

        if expected_subject.is_some_and(|subject| subject != intent.subject_id) {
            return reject(RejectReason::IdentityMismatch, Stage::SignatureVerified);
        }

        // Lost a race with a concurrent request carrying the same nonce.
        if !self.ledger.claim(fields.nonce, now) {
            return reject(RejectReason::ReplayDetected, Stage::SignatureVerified);
        }

        Ok(ValidatedRequest {
            intent,
            nonce: fields.nonce.to_string(),
            client_timestamp: fields.timestamp,
        })
    }

    fn check_fields(request: &InboundRequest) -> Option<Fields<'_>> {
        let body = &request.body;
        let headers = &request.headers;

        let fields = Fields {
            encrypted: non_empty(body.encrypted.as_ref())?,
            iv: non_empty(body.iv.as_ref())?,
            nonce: non_empty(body.nonce.as_ref())?,
            header_nonce: non_empty(headers.nonce.as_ref())?,
            signature: non_empty(headers.signature.as_ref())?,
            timestamp: body.timestamp?,
        };

        if fields.nonce.len() > MAX_NONCE_LENGTH || fields.header_nonce.len() > MAX_NONCE_LENGTH {
            return None;
        }

        let header_timestamp: i64 = non_empty(headers.timestamp.as_ref())?.trim().parse().ok()?;
        (header_timestamp == fields.timestamp).then_some(fields)
    }

    /// Bad base64, bad hex and bad ciphertext are indistinguishable here.
    fn decrypt(&self, encrypted: &str, iv: &str) -> Option<Value> {
        let ciphertext = decode_base64(encrypted).ok()?;
        let iv = hex::decode(iv).ok()?;
        decrypt_intent::<Value>(&ciphertext, &iv, &self.key).ok()
    }
}
