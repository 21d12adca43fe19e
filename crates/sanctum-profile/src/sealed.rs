//! Field-level encrypted forms of interaction and profile records.
//!
//! Sensitive fields are wrapped individually as `EncryptedMessage`
//! (collections as encrypted JSON). Ids, counters, scores and timestamps stay
//! plaintext so the document store can index them.

use std::collections::BTreeMap;

use sanctum_core::Emotion;
use sanctum_crypto::{EncryptedMessage, EncryptionManager};
use serde::{Deserialize, Serialize};

use crate::error::ProfileResult;
use crate::model::{ConversationEntry, EmotionalPattern, UserAdaptiveProfile, UserInteraction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedUserInteraction {
    pub user_id: String,
    pub session_id: String,
    pub message: EncryptedMessage,
    pub detected_emotion: EncryptedMessage,
    pub response_emotion: EncryptedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_tags: Option<EncryptedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_score: Option<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedUserAdaptiveProfile {
    pub user_id: String,
    pub emotional_patterns: EncryptedMessage,
    pub preferred_topics: EncryptedMessage,
    pub conversation_history: EncryptedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_emotion: Option<EncryptedMessage>,
    pub interaction_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

fn open_emotion(m: &EncryptionManager, msg: &EncryptedMessage) -> ProfileResult<Emotion> {
    Ok(m.decrypt(msg)?.parse::<Emotion>()?)
}

pub fn seal_interaction(
    m: &EncryptionManager,
    i: &UserInteraction,
) -> ProfileResult<EncryptedUserInteraction> {
    Ok(EncryptedUserInteraction {
        user_id: i.user_id.clone(),
        session_id: i.session_id.clone(),
        message: m.encrypt(&i.message)?,
        detected_emotion: m.encrypt(i.detected_emotion.as_str())?,
        response_emotion: m.encrypt(i.response_emotion.as_str())?,
        contextual_tags: i
            .contextual_tags
            .as_ref()
            .map(|tags| m.encrypt_json(tags))
            .transpose()?,
        feedback_score: i.feedback_score,
        timestamp: i.timestamp,
    })
}

pub fn open_interaction(
    m: &EncryptionManager,
    e: &EncryptedUserInteraction,
) -> ProfileResult<UserInteraction> {
    Ok(UserInteraction {
        user_id: e.user_id.clone(),
        session_id: e.session_id.clone(),
        message: m.decrypt(&e.message)?,
        detected_emotion: open_emotion(m, &e.detected_emotion)?,
        response_emotion: open_emotion(m, &e.response_emotion)?,
        contextual_tags: e
            .contextual_tags
            .as_ref()
            .map(|tags| m.decrypt_json(tags))
            .transpose()?,
        feedback_score: e.feedback_score,
        timestamp: e.timestamp,
    })
}

/// Whole-profile envelope. Only the most recent `history_limit` history
/// entries are kept.
pub fn seal_profile(
    m: &EncryptionManager,
    p: &UserAdaptiveProfile,
    history_limit: usize,
) -> ProfileResult<EncryptedUserAdaptiveProfile> {
    let skip = p.conversation_history.len().saturating_sub(history_limit);
    let history: &[ConversationEntry] = &p.conversation_history[skip..];

    Ok(EncryptedUserAdaptiveProfile {
        user_id: p.user_id.clone(),
        emotional_patterns: m.encrypt_json(&p.emotional_patterns)?,
        preferred_topics: m.encrypt_json(&p.preferred_topics)?,
        conversation_history: m.encrypt_json(history)?,
        last_emotion: p
            .last_emotion
            .map(|e| m.encrypt(e.as_str()))
            .transpose()?,
        interaction_count: p.interaction_count,
        created_at: p.created_at,
        updated_at: p.updated_at,
    })
}

pub fn open_profile(
    m: &EncryptionManager,
    e: &EncryptedUserAdaptiveProfile,
) -> ProfileResult<UserAdaptiveProfile> {
    Ok(UserAdaptiveProfile {
        user_id: e.user_id.clone(),
        emotional_patterns: open_patterns(m, e)?,
        preferred_topics: m.decrypt_json(&e.preferred_topics)?,
        conversation_history: m.decrypt_json(&e.conversation_history)?,
        last_emotion: e
            .last_emotion
            .as_ref()
            .map(|msg| open_emotion(m, msg))
            .transpose()?,
        interaction_count: e.interaction_count,
        created_at: e.created_at,
        updated_at: e.updated_at,
    })
}

/// Decrypt only the pattern table, leaving history and topics sealed.
pub fn open_patterns(
    m: &EncryptionManager,
    e: &EncryptedUserAdaptiveProfile,
) -> ProfileResult<BTreeMap<Emotion, EmotionalPattern>> {
    Ok(m.decrypt_json(&e.emotional_patterns)?)
}
