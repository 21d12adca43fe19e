use sanctum_core::SanctumError;
use sanctum_crypto::CryptoError;
use sanctum_storage::StorageError;
use thiserror::Error;

pub type ProfileResult<T> = Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("unknown emotion label: {0}")]
    UnknownEmotion(String),

    #[error("feedback score {0} outside 1..=5")]
    InvalidFeedback(u8),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("emotion log queue is full")]
    QueueFull,

    #[error("emotion log queue is closed")]
    QueueClosed,
}

impl ProfileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProfileError::Persistence(e) => e.is_retryable(),
            ProfileError::QueueFull => true,
            _ => false,
        }
    }
}

impl From<SanctumError> for ProfileError {
    fn from(e: SanctumError) -> Self {
        match e {
            SanctumError::UnknownEmotion(label) => ProfileError::UnknownEmotion(label),
        }
    }
}
