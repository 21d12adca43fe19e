use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Bad or missing password/salt, rejected parameters, or KDF backend failure.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encrypt/decrypt attempted before `EncryptionManager::initialize` completed.
    #[error("encryption key is not initialized")]
    UninitializedKey,

    /// The GCM tag did not verify: tampered or corrupted data, or the wrong key.
    #[error("cannot decrypt: authentication failed")]
    Authentication,

    /// Ciphertext envelope is structurally invalid (encoding, lengths, UTF-8).
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}
