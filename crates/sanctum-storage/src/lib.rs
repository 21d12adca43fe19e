//! sanctum-storage: the external collaborators the encryption layer writes through
//!
//! - `BlobStore`: opaque encrypted file blobs
//! - `DocumentStore`: JSON records (encrypted interactions, profile snapshots, logs)
//! - `UrlSigner`: time-limited retrieval URLs
//!
//! `OpendalStore` and `PresignSigner` bind these to an OpenDAL `Operator`
//! (S3-compatible in production, in-memory in tests).

pub mod error;
pub mod operator;
pub mod retry;
pub mod signer;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use operator::{build_operator, memory_operator, S3Credentials};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use signer::{PresignSigner, UrlSigner};
pub use store::{BlobStore, DocumentStore, OpendalStore};
