pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::SanctumError;
pub use types::Emotion;
