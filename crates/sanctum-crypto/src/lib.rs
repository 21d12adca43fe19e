//! sanctum-crypto: client-side encryption for chat messages, attachments, and profiles
//!
//! Architecture: one password-derived AES-256-GCM key per session
//!
//! ```text
//! passphrase + salt ──PBKDF2-SHA256 (≥100k) or Argon2id──▶ DerivedKey (256-bit, never exported)
//!   ├── Messages: AES-256-GCM, random 96-bit IV per call → { iv, content } (base64)
//!   └── Files:    chunked AES-256-GCM stream
//!                 nonce_i = base_iv ⊕ i, AAD = i (u64 BE) || final flag
//! ```

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod manager;
pub mod stream;

pub use cipher::EncryptedMessage;
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, DerivedKey, KdfParams};
pub use manager::{EncryptionManager, MasterSecret};
pub use stream::{StreamOpener, StreamSealer};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Lowest accepted PBKDF2 iteration count
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;
