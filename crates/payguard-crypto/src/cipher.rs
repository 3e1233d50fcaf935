//! Payload cipher: AES-256-CBC with PKCS#7 padding.
//!
//! Every call to [`encrypt_intent`] draws a fresh random 16-byte IV. The IV
//! travels next to the ciphertext and is not secret.
//!
//! Decryption failures are collapsed into a single [`CipherError::Decrypt`]:
//! wrong key, truncated ciphertext, bad padding and non-JSON plaintext are
//! indistinguishable to the caller, so nothing downstream can become a
//! padding oracle.

use std::fmt;

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{de::DeserializeOwned, Serialize};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Key size in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// Initialization vector size in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// Pre-shared 256-bit payload encryption key.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

/// Error returned when key material cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("encryption key is not valid hex")]
    InvalidHex,
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    WrongLength(usize),
}

/// Errors from the payload cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("payload could not be serialized")]
    Serialize,
    #[error("decryption failed")]
    Decrypt,
}

impl EncryptionKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 64 hex characters.
    ///
    /// # Errors
    /// Returns [`KeyError`] if the input is not hex or does not decode to 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| KeyError::InvalidHex)?;
        let len = bytes.len();
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::WrongLength(len))?;
        Ok(Self(arr))
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Serialize `intent` to JSON and encrypt it under `key`.
///
/// Returns `(ciphertext, iv)`.
///
/// # Errors
/// Returns [`CipherError::Serialize`] if the intent cannot be serialized.
pub fn encrypt_intent<T: Serialize>(
    intent: &T,
    key: &EncryptionKey,
) -> Result<(Vec<u8>, [u8; IV_LEN]), CipherError> {
    let plaintext = serde_json::to_vec(intent).map_err(|_| CipherError::Serialize)?;
    let iv: [u8; IV_LEN] = rand::random();
    let ciphertext =
        Aes256CbcEnc::new(&key.0.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);
    Ok((ciphertext, iv))
}

/// Decrypt `ciphertext` and parse the plaintext as `T`.
///
/// # Errors
/// Returns [`CipherError::Decrypt`] for every failure: bad IV length, wrong
/// key, corrupted ciphertext, padding mismatch, or plaintext that is not a `T`.
pub fn decrypt_intent<T: DeserializeOwned>(
    ciphertext: &[u8],
    iv: &[u8],
    key: &EncryptionKey,
) -> Result<T, CipherError> {
    let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| CipherError::Decrypt)?;
    let plaintext = Aes256CbcDec::new(&key.0.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::Decrypt)?;
    serde_json::from_slice(&plaintext).map_err(|_| CipherError::Decrypt)
}
