use sanctum_crypto::CryptoError;
use sanctum_storage::StorageError;
use thiserror::Error;

pub type FileResult<T> = Result<T, FileError>;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file is {size} bytes, limit is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("file metadata has no IV")]
    MissingIv,

    #[error("file metadata is missing {0}")]
    InvalidMetadata(&'static str),

    #[error("video content could not be decoded")]
    VideoNotDecodable,

    #[error("thumbnail generation failed: {0}")]
    Thumbnail(String),

    #[error("superseded by a newer request")]
    Cancelled,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FileError {
    /// True when the content cannot be shown (decrypt or metadata failure).
    /// UI code renders these as "unable to display" rather than an error.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FileError::Crypto(_)
                | FileError::MissingIv
                | FileError::InvalidMetadata(_)
                | FileError::VideoNotDecodable
                | FileError::Storage(StorageError::NotFound(_))
        )
    }
}
