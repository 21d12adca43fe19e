//! Plaintext interaction and profile records. Timestamps are Unix milliseconds.

use std::collections::BTreeMap;

use sanctum_core::Emotion;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
    pub detected_emotion: Emotion,
    pub response_emotion: Emotion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_score: Option<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub message: String,
    pub detected_emotion: Emotion,
    pub response_emotion: Emotion,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalPattern {
    pub emotion: Emotion,
    /// Times this emotion was detected
    pub frequency: u32,
    /// Approaches that scored ≥ 4, most recent last
    pub effective_approaches: Vec<String>,
    pub feedback_total: u32,
    pub feedback_count: u32,
    /// Counts of the emotion detected next, after this one
    pub transitions: BTreeMap<Emotion, u32>,
    pub last_seen: u64,
}

impl EmotionalPattern {
    pub fn new(emotion: Emotion) -> Self {
        Self {
            emotion,
            frequency: 0,
            effective_approaches: Vec::new(),
            feedback_total: 0,
            feedback_count: 0,
            transitions: BTreeMap::new(),
            last_seen: 0,
        }
    }

    pub fn average_feedback(&self) -> Option<f64> {
        (self.feedback_count > 0).then(|| self.feedback_total as f64 / self.feedback_count as f64)
    }

    /// Transitions out of this emotion, most frequent first.
    pub fn top_transitions(&self, n: usize) -> Vec<(Emotion, u32)> {
        let mut out: Vec<_> = self.transitions.iter().map(|(e, c)| (*e, *c)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out.truncate(n);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAdaptiveProfile {
    pub user_id: String,
    pub emotional_patterns: BTreeMap<Emotion, EmotionalPattern>,
    /// Tag → times seen
    pub preferred_topics: BTreeMap<String, u32>,
    pub conversation_history: Vec<ConversationEntry>,
    pub last_emotion: Option<Emotion>,
    pub interaction_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl UserAdaptiveProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            emotional_patterns: BTreeMap::new(),
            preferred_topics: BTreeMap::new(),
            conversation_history: Vec::new(),
            last_emotion: None,
            interaction_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Fold one interaction into the pattern table, topics, and rolling history.
    pub fn observe(&mut self, interaction: &UserInteraction, history_window: usize) {
        let now = interaction.timestamp;
        let emotion = interaction.detected_emotion;

        if let Some(prev) = self.last_emotion {
            *self
                .emotional_patterns
                .entry(prev)
                .or_insert_with(|| EmotionalPattern::new(prev))
                .transitions
                .entry(emotion)
                .or_insert(0) += 1;
        }

        let pattern = self
            .emotional_patterns
            .entry(emotion)
            .or_insert_with(|| EmotionalPattern::new(emotion));
        pattern.frequency += 1;
        pattern.last_seen = now;

        for tag in interaction.contextual_tags.iter().flatten() {
            *self.preferred_topics.entry(tag.clone()).or_insert(0) += 1;
        }

        self.conversation_history.push(ConversationEntry {
            message: interaction.message.clone(),
            detected_emotion: emotion,
            response_emotion: interaction.response_emotion,
            timestamp: now,
        });
        if self.conversation_history.len() > history_window {
            let excess = self.conversation_history.len() - history_window;
            self.conversation_history.drain(..excess);
        }

        self.last_emotion = Some(emotion);
        self.interaction_count += 1;
        if self.created_at == 0 {
            self.created_at = now;
        }
        self.updated_at = now;
    }

    /// Record feedback for an approach used while `emotion` was detected.
    pub fn apply_feedback(&mut self, emotion: Emotion, approach: &str, score: u8, max_approaches: usize) {
        let pattern = self
            .emotional_patterns
            .entry(emotion)
            .or_insert_with(|| EmotionalPattern::new(emotion));
        pattern.feedback_total += score as u32;
        pattern.feedback_count += 1;
        if score >= 4 {
            pattern.effective_approaches.retain(|a| a != approach);
            pattern.effective_approaches.push(approach.to_string());
            if pattern.effective_approaches.len() > max_approaches {
                let excess = pattern.effective_approaches.len() - max_approaches;
                pattern.effective_approaches.drain(..excess);
            }
        }
    }

    /// Top `n` topics by count.
    pub fn top_topics(&self, n: usize) -> Vec<&str> {
        let mut topics: Vec<_> = self.preferred_topics.iter().collect();
        topics.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        topics.into_iter().take(n).map(|(t, _)| t.as_str()).collect()
    }
}
