//! Shared cryptography for the payguard payment-request protocol
//!
//! This crate is used by the Rust backend (as a native library) to validate
//! sealed payment requests, and by browser clients (compiled to WASM) to
//! build them. Both sides must agree byte-for-byte on the cipher, the
//! canonical signing form and the wire encoding, which is why they live here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use wasm_bindgen::prelude::*;

mod cipher;
pub use cipher::{
    decrypt_intent, encrypt_intent, CipherError, EncryptionKey, KeyError, IV_LEN, KEY_LEN,
};

mod signature;
pub use signature::{canonical_bytes, sign, verify, SignError, SigningSecret};

mod envelope;
pub use envelope::{random_hex, seal_order, OrderIntent, SealError, SealedRequest, SecureEnvelope};

/// Error type for base64 decoding failures
#[derive(Debug, thiserror::Error)]
#[error("invalid base64 encoding: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Encode bytes as standard (padded) base64, the ciphertext wire encoding.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 into bytes.
///
/// # Errors
/// Returns `DecodeError` if the input is not valid base64
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(encoded).map_err(DecodeError::from)
}

/// Sign a JSON payload and nonce (WASM binding).
///
/// The payload is re-canonicalised before signing, so key order in the
/// caller's JSON does not matter.
///
/// # Errors
/// Returns `JsError` if `payload_json` is not valid JSON
#[wasm_bindgen(js_name = "signRequest")]
pub fn sign_request_js(payload_json: &str, nonce: &str, secret: &str) -> Result<String, JsError> {
    let payload: serde_json::Value =
        serde_json::from_str(payload_json).map_err(|e| JsError::new(&e.to_string()))?;
    sign(&payload, nonce, &SigningSecret::new(secret.as_bytes()))
        .map_err(|e| JsError::new(&e.to_string()))
}

/// Seal an order intent into a request body and signature headers (WASM binding).
///
/// Returns a JSON object `{envelope, signature, nonce, timestamp}`.
///
/// # Errors
/// Returns `JsError` if the key is not 64 hex characters or the intent is not
/// a valid order intent.
#[wasm_bindgen(js_name = "sealOrder")]
pub fn seal_order_js(
    intent_json: &str,
    key_hex: &str,
    secret: &str,
    now_ms: f64,
) -> Result<String, JsError> {
    let intent: OrderIntent =
        serde_json::from_str(intent_json).map_err(|e| JsError::new(&e.to_string()))?;
    let key = EncryptionKey::from_hex(key_hex).map_err(|e| JsError::new(&e.to_string()))?;
    // JS numbers carry millisecond timestamps exactly up to 2^53.
    #[allow(clippy::cast_possible_truncation)]
    let now_ms = now_ms as i64;
    let sealed = seal_order(&intent, &key, &SigningSecret::new(secret.as_bytes()), now_ms)
        .map_err(|e| JsError::new(&e.to_string()))?;
    serde_json::to_string(&sealed).map_err(|e| JsError::new(&e.to_string()))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any byte sequence survives the ciphertext wire encoding
        #[test]
        fn roundtrip_encode_decode(bytes: Vec<u8>) {
            let encoded = encode_base64(&bytes);
            let decoded = decode_base64(&encoded).unwrap();
            prop_assert_eq!(decoded, bytes);
        }
    }
}
