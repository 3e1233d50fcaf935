//! Wire types for sealed payment requests and the client-side sealing step.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::cipher::{encrypt_intent, CipherError, EncryptionKey};
use crate::signature::{sign, SignError, SigningSecret};
use crate::encode_base64;

/// Bytes of randomness in a request id (hex-encoded to 64 characters).
const REQUEST_ID_BYTES: usize = 32;
/// Bytes of randomness in a client nonce (hex-encoded to 32 characters).
const NONCE_BYTES: usize = 16;

/// The plaintext payment intent. Only ever exists on the wire encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub course_id: String,
    /// Unique per attempt: 32 random bytes, hex-encoded.
    pub request_id: String,
    /// Client clock, Unix milliseconds.
    pub timestamp: i64,
    pub subject_id: String,
}

impl OrderIntent {
    /// Build an intent for `course_id` on behalf of `subject_id` with a fresh request id.
    #[must_use]
    pub fn new(course_id: &str, subject_id: &str, now_ms: i64) -> Self {
        Self {
            course_id: course_id.to_string(),
            request_id: random_hex(REQUEST_ID_BYTES),
            timestamp: now_ms,
            subject_id: subject_id.to_string(),
        }
    }
}

/// Request body of a sealed payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureEnvelope {
    /// Base64 AES-256-CBC ciphertext of the [`OrderIntent`] JSON.
    pub encrypted: String,
    /// Hex-encoded 16-byte IV.
    pub iv: String,
    pub nonce: String,
    /// Client clock, Unix milliseconds.
    pub timestamp: i64,
}

/// Everything a client sends: the body plus the values for the
/// `X-Signature`, `X-Nonce` and `X-Timestamp` headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRequest {
    pub envelope: SecureEnvelope,
    pub signature: String,
    pub nonce: String,
    pub timestamp: i64,
}

/// Errors from sealing a request.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Sign(#[from] SignError),
}

/// Hex-encode `len_bytes` random bytes.
#[must_use]
pub fn random_hex(len_bytes: usize) -> String {
    let mut buf = vec![0u8; len_bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Encrypt and sign `intent` under a fresh nonce, stamped at `now_ms`.
///
/// # Errors
/// Returns [`SealError`] if the intent cannot be serialized.
pub fn seal_order(
    intent: &OrderIntent,
    key: &EncryptionKey,
    secret: &SigningSecret,
    now_ms: i64,
) -> Result<SealedRequest, SealError> {
    let nonce = random_hex(NONCE_BYTES);
    let (ciphertext, iv) = encrypt_intent(intent, key)?;
    let signature = sign(intent, &nonce, secret)?;

    Ok(SealedRequest {
        envelope: SecureEnvelope {
            encrypted: encode_base64(&ciphertext),
            iv: hex::encode(iv),
            nonce: nonce.clone(),
            timestamp: now_ms,
        },
        signature,
        nonce,
        timestamp: now_ms,
    })
}
