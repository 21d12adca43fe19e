//! Session-scoped key holder: construct → initialize(password) → ready

use serde::de::DeserializeOwned;
use serde::Serialize;
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;
use tracing::{debug, info};

use sanctum_core::config::CryptoConfig;

use crate::cipher::{open, random_iv, seal, EncryptedMessage};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, DerivedKey, KdfParams};
use crate::stream::{self, StreamOpener, StreamSealer};
use crate::IV_SIZE;

/// Externally supplied master passphrase and salt.
pub struct MasterSecret {
    pub password: SecretString,
    pub salt: String,
}

impl MasterSecret {
    /// Read the passphrase and salt from the environment variables named in config.
    pub fn from_env(cfg: &CryptoConfig) -> CryptoResult<Self> {
        let password = std::env::var(&cfg.password_env).map_err(|_| {
            CryptoError::KeyDerivation(format!("{} is not set", cfg.password_env))
        })?;
        let salt = std::env::var(&cfg.salt_env)
            .map_err(|_| CryptoError::KeyDerivation(format!("{} is not set", cfg.salt_env)))?;
        Ok(Self {
            password: SecretString::from(password),
            salt,
        })
    }
}

/// Owns the session's `DerivedKey` and performs all message-level encryption.
///
/// The key is written once and only read afterwards, so the manager can be
/// shared behind an `Arc` across tasks without locking.
pub struct EncryptionManager {
    params: KdfParams,
    salt: Vec<u8>,
    key: OnceLock<DerivedKey>,
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("params", &self.params)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl EncryptionManager {
    pub fn new(params: KdfParams, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            params,
            salt: salt.into(),
            key: OnceLock::new(),
        }
    }

    pub fn from_config(cfg: &CryptoConfig, salt: &str) -> CryptoResult<Self> {
        Ok(Self::new(KdfParams::from_config(cfg)?, salt.as_bytes()))
    }

    /// A manager that is ready immediately, bypassing the KDF.
    pub fn with_key(key: DerivedKey) -> Self {
        let manager = Self::new(KdfParams::default(), Vec::new());
        // Freshly constructed lock, cannot already be set.
        let _ = manager.key.set(key);
        manager
    }

    pub fn is_ready(&self) -> bool {
        self.key.get().is_some()
    }

    /// Derive the session key. Runs the KDF on the blocking pool.
    pub async fn initialize(&self, password: &SecretString) -> CryptoResult<()> {
        if self.is_ready() {
            return Err(CryptoError::KeyDerivation("already initialized".into()));
        }

        let password = SecretString::from(password.expose_secret().to_owned());
        let salt = self.salt.clone();
        let params = self.params.clone();

        let key = tokio::task::spawn_blocking(move || derive_key(&password, &salt, &params))
            .await
            .map_err(|e| CryptoError::KeyDerivation(format!("KDF task failed: {e}")))??;

        self.key
            .set(key)
            .map_err(|_| CryptoError::KeyDerivation("already initialized".into()))?;
        info!(kdf = ?self.params, "encryption key initialized");
        Ok(())
    }

    /// Initialize from a `MasterSecret`, replacing the configured salt.
    pub async fn initialize_with(cfg: &CryptoConfig, secret: &MasterSecret) -> CryptoResult<Self> {
        let manager = Self::from_config(cfg, &secret.salt)?;
        manager.initialize(&secret.password).await?;
        Ok(manager)
    }

    fn key(&self) -> CryptoResult<&DerivedKey> {
        self.key.get().ok_or(CryptoError::UninitializedKey)
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedMessage> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    pub fn decrypt(&self, msg: &EncryptedMessage) -> CryptoResult<String> {
        let plain = self.decrypt_bytes(msg)?;
        String::from_utf8(plain)
            .map_err(|_| CryptoError::Malformed("decrypted message is not UTF-8".into()))
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CryptoResult<EncryptedMessage> {
        let (iv, ciphertext) = self.seal_detached(plaintext)?;
        Ok(EncryptedMessage::from_parts(&iv, &ciphertext))
    }

    pub fn decrypt_bytes(&self, msg: &EncryptedMessage) -> CryptoResult<Vec<u8>> {
        let key = self.key()?;
        let (iv, content) = msg.decode()?;
        let plain = open(key, &iv, &[], &content)?;
        debug!(bytes = plain.len(), "message decrypted");
        Ok(plain)
    }

    /// Serialize to JSON and encrypt the result as one message.
    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<EncryptedMessage> {
        let json = serde_json::to_vec(value)
            .map_err(|e| CryptoError::Encryption(format!("serializing payload: {e}")))?;
        self.encrypt_bytes(&json)
    }

    pub fn decrypt_json<T: DeserializeOwned>(&self, msg: &EncryptedMessage) -> CryptoResult<T> {
        let json = self.decrypt_bytes(msg)?;
        serde_json::from_slice(&json)
            .map_err(|e| CryptoError::Malformed(format!("decrypted payload is not valid JSON: {e}")))
    }

    /// Single-shot AES-GCM with a fresh IV, returning raw bytes.
    pub fn seal_detached(&self, plaintext: &[u8]) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
        let key = self.key()?;
        let iv = random_iv();
        let ciphertext = seal(key, &iv, &[], plaintext)?;
        Ok((iv, ciphertext))
    }

    pub fn open_detached(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        open(self.key()?, iv, &[], ciphertext)
    }

    /// Start a chunked file encryption with a fresh base IV.
    pub fn sealer(&self) -> CryptoResult<StreamSealer<'_>> {
        Ok(StreamSealer::new(self.key()?))
    }

    pub fn opener(&self, base_iv: [u8; IV_SIZE]) -> CryptoResult<StreamOpener<'_>> {
        Ok(StreamOpener::new(self.key()?, base_iv))
    }

    pub fn decrypt_stream(
        &self,
        base_iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
        chunk_size: usize,
    ) -> CryptoResult<Vec<u8>> {
        stream::decrypt_stream(self.key()?, base_iv, ciphertext, chunk_size)
    }

    pub fn encrypt_stream(
        &self,
        plaintext: &[u8],
        chunk_size: usize,
    ) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
        stream::encrypt_stream(self.key()?, plaintext, chunk_size)
    }
}
