use thiserror::Error;

#[derive(Debug, Error)]
pub enum SanctumError {
    #[error("unknown emotion label: {0}")]
    UnknownEmotion(String),
}
