use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected a read or write. `retryable` marks transient failures.
    #[error("persistence failed during {op} on {path}: {reason}")]
    Persistence {
        op: &'static str,
        path: String,
        retryable: bool,
        reason: String,
    },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage key component {0:?}")]
    InvalidKey(String),

    #[error("document {path} is not valid JSON: {reason}")]
    Serialization { path: String, reason: String },

    #[error("unknown bucket {requested:?} (signer serves {configured:?})")]
    UnknownBucket {
        requested: String,
        configured: String,
    },
}

impl StorageError {
    pub fn from_opendal(op: &'static str, path: &str, err: opendal::Error) -> Self {
        if err.kind() == opendal::ErrorKind::NotFound {
            return StorageError::NotFound(path.to_string());
        }
        StorageError::Persistence {
            op,
            path: path.to_string(),
            retryable: err.is_temporary(),
            reason: err.to_string(),
        }
    }

    /// A transient failure, for backends outside OpenDAL.
    pub fn transient(op: &'static str, path: &str, reason: impl Into<String>) -> Self {
        StorageError::Persistence {
            op,
            path: path.to_string(),
            retryable: true,
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Persistence { retryable: true, .. })
    }
}
