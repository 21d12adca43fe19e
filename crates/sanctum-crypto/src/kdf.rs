//! Key derivation: passphrase + salt → AES-256-GCM key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use sanctum_core::config::CryptoConfig;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, MIN_PBKDF2_ITERATIONS};

/// A 256-bit key derived from the session passphrase.
///
/// Only usable for AES-GCM inside this crate: the raw bytes can be imported
/// but never read back out. Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// KDF selection and cost parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfParams {
    /// PBKDF2-HMAC-SHA256, interoperable with the browser client.
    Pbkdf2 { iterations: u32 },
    /// Argon2id (memory-hard).
    Argon2id {
        /// Memory cost in KiB
        mem_cost_kib: u32,
        /// Time cost / iterations
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2 {
            iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn from_config(cfg: &CryptoConfig) -> CryptoResult<Self> {
        match cfg.kdf.to_ascii_lowercase().as_str() {
            "pbkdf2" => Ok(KdfParams::Pbkdf2 {
                iterations: cfg.pbkdf2_iterations,
            }),
            "argon2id" => Ok(KdfParams::Argon2id {
                mem_cost_kib: cfg.argon2_mem_cost_kib,
                time_cost: cfg.argon2_time_cost,
                parallelism: cfg.argon2_parallelism,
            }),
            other => Err(CryptoError::KeyDerivation(format!(
                "unknown kdf {other:?} (expected \"pbkdf2\" or \"argon2id\")"
            ))),
        }
    }
}

/// Derive a 256-bit key from a passphrase and salt.
///
/// The salt is configuration, not a secret; it must be the same value every
/// time the key is re-derived or previously written ciphertext becomes
/// unreadable.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<DerivedKey> {
    let password = password.expose_secret();
    if password.is_empty() {
        return Err(CryptoError::KeyDerivation("password is empty".into()));
    }
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("salt is empty".into()));
    }

    let mut key = [0u8; KEY_SIZE];
    match params {
        KdfParams::Pbkdf2 { iterations } => {
            if *iterations < MIN_PBKDF2_ITERATIONS {
                return Err(CryptoError::KeyDerivation(format!(
                    "PBKDF2 iterations {iterations} below minimum {MIN_PBKDF2_ITERATIONS}"
                )));
            }
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, *iterations, &mut key);
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => {
            let argon2_params = Params::new(*mem_cost_kib, *time_cost, *parallelism, Some(KEY_SIZE))
                .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;

            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(password.as_bytes(), salt, &mut key)
                .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id KDF failed: {e}")))?;
        }
    }

    Ok(DerivedKey::from_bytes(key))
}
