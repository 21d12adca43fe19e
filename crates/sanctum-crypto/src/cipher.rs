//! AES-256-GCM primitives and the `EncryptedMessage` wire format
//!
//! At-rest JSON, bit-exact with the browser client:
//! ```text
//! { "iv": "<base64, 12 bytes>", "content": "<base64, ciphertext || 16-byte tag>" }
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::DerivedKey;
use crate::{IV_SIZE, TAG_SIZE};

/// Output of one authenticated-encryption operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub iv: String,
    pub content: String,
}

impl EncryptedMessage {
    pub fn from_parts(iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Self {
        Self {
            iv: STANDARD.encode(iv),
            content: STANDARD.encode(ciphertext),
        }
    }

    /// Decode both fields, checking the IV length and minimum ciphertext length.
    pub fn decode(&self) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
        let iv_bytes = STANDARD
            .decode(&self.iv)
            .map_err(|e| CryptoError::Malformed(format!("iv is not base64: {e}")))?;
        let iv: [u8; IV_SIZE] = iv_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::Malformed(format!(
                "iv decodes to {} bytes (expected {IV_SIZE})",
                iv_bytes.len()
            ))
        })?;

        let content = STANDARD
            .decode(&self.content)
            .map_err(|e| CryptoError::Malformed(format!("content is not base64: {e}")))?;
        if content.len() < TAG_SIZE {
            return Err(CryptoError::Malformed(format!(
                "content too short: {} bytes (minimum {TAG_SIZE})",
                content.len()
            )));
        }

        Ok((iv, content))
    }

    /// JSON-stringify, for fields that store an encrypted value as a string.
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    pub fn from_json(s: &str) -> CryptoResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| CryptoError::Malformed(format!("not an encrypted message: {e}")))
    }
}

/// Fresh random 96-bit IV from the thread-local CSPRNG.
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

pub(crate) fn seal(
    key: &DerivedKey,
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

pub(crate) fn open(
    key: &DerivedKey,
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Authentication);
    }
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}
