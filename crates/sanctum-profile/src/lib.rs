//! sanctum-profile: encrypted adaptive-learning profiles
//!
//! Interactions are sealed field by field and written to
//! `user_interactions/{id}`; the per-user profile lives decrypted in memory
//! and is snapshotted, re-encrypted, to `user_profiles/{user_id}`.
//! Detected emotions are logged through `EmotionLogQueue`.

pub mod context;
pub mod emotion_log;
pub mod error;
pub mod model;
pub mod sealed;
pub mod store;

pub use emotion_log::{EmotionLogQueue, EmotionSample, SealedEmotionSample, EMOTION_LOGS};
pub use error::{ProfileError, ProfileResult};
pub use model::{ConversationEntry, EmotionalPattern, UserAdaptiveProfile, UserInteraction};
pub use sealed::{EncryptedUserAdaptiveProfile, EncryptedUserInteraction};
pub use store::{EncryptedProfileStore, INTERACTIONS, PROFILES};
