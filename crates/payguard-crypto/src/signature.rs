//! Request signing: HMAC-SHA256 over `canonical(payload) ‖ nonce`.
//!
//! The canonical form is the payload's JSON with object keys in lexicographic
//! order and no insignificant whitespace. Client and server canonicalize
//! independently, so field order on the wire never affects the MAC.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Pre-shared signing secret.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.to_vec())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Errors from signing.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] serde_json::Error),
    #[error("signing secret rejected by HMAC")]
    InvalidSecret,
}

/// Serialize `payload` to canonical JSON bytes.
///
/// Routing through `serde_json::Value` sorts object keys, since its map type
/// is ordered.
///
/// # Errors
/// Returns an error if the payload cannot be represented as JSON.
pub fn canonical_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(payload)?;
    serde_json::to_vec(&value)
}

fn keyed_mac<T: Serialize>(
    payload: &T,
    nonce: &str,
    secret: &SigningSecret,
) -> Result<HmacSha256, SignError> {
    let mut mac = HmacSha256::new_from_slice(&secret.0).map_err(|_| SignError::InvalidSecret)?;
    mac.update(&canonical_bytes(payload)?);
    mac.update(nonce.as_bytes());
    Ok(mac)
}

/// Compute the lowercase hex HMAC-SHA256 signature of `payload` and `nonce`.
///
/// # Errors
/// Returns [`SignError`] if the payload cannot be canonicalized.
pub fn sign<T: Serialize>(
    payload: &T,
    nonce: &str,
    secret: &SigningSecret,
) -> Result<String, SignError> {
    let mac = keyed_mac(payload, nonce, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature over `payload` and `nonce`.
///
/// The tag comparison is constant-time. Malformed hex or an unserializable
/// payload verify as `false`.
#[must_use]
pub fn verify<T: Serialize>(
    payload: &T,
    nonce: &str,
    signature_hex: &str,
    secret: &SigningSecret,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mac) = keyed_mac(payload, nonce, secret) else {
        return false;
    };
    mac.verify_slice(&signature).is_ok()
}
