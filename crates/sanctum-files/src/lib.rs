//! sanctum-files: attachment encryption
//!
//! ```text
//! FileInput ──validate──▶ thumbnail / video probe (plaintext, best effort)
//!           ──FileCipher──▶ chunked AES-GCM blob + FileMetadata
//!           ──SecureFileEnvelope──▶ random storage name, encrypted original name,
//!                                   access token, BlobStore write
//! ```

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod preview;
pub mod thumbnail;
pub mod validate;
pub mod video;

pub use cipher::{FileCipher, ProgressFn};
pub use envelope::SecureFileEnvelope;
pub use error::{FileError, FileResult};
pub use metadata::{
    DecryptedFile, EncryptedFile, FileInput, FileMetadata, ProcessedFile, SecureFileMetadata,
};
pub use preview::{PreviewLoader, PreviewRegistry, PreviewUrl};
pub use validate::FilePolicy;
pub use video::VideoMetadata;
