//! Plain-language adaptive context for the chat layer.

use sanctum_core::Emotion;

use crate::model::EmotionalPattern;

pub fn default_context(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Neutral => "The user seems calm. Keep the conversation open and attentive.",
        Emotion::Happy => "The user seems to be in a good mood. Share in their positivity.",
        Emotion::Sad => "The user may be feeling down. Respond with warmth and patience.",
        Emotion::Angry => "The user may be frustrated. Stay calm and acknowledge their feelings.",
        Emotion::Fearful => "The user may be anxious. Offer reassurance and a steady tone.",
        Emotion::Disgusted => "The user may be uncomfortable. Be respectful and non-judgmental.",
        Emotion::Surprised => "The user seems surprised. Help them make sense of what happened.",
    }
}

/// Describe a pattern with enough observations behind it.
pub fn compose(pattern: &EmotionalPattern, total_interactions: u64) -> String {
    let mut parts = Vec::with_capacity(4);

    let share = if total_interactions > 0 {
        pattern.frequency as f64 * 100.0 / total_interactions as f64
    } else {
        0.0
    };
    parts.push(format!(
        "The user has felt {} in {} of {} recorded conversations ({share:.0}%).",
        pattern.emotion, pattern.frequency, total_interactions
    ));

    if !pattern.effective_approaches.is_empty() {
        parts.push(format!(
            "Approaches that helped before: {}.",
            pattern.effective_approaches.join(", ")
        ));
    }

    if let Some(avg) = pattern.average_feedback() {
        parts.push(format!(
            "Average feedback while {} is {avg:.1} out of 5.",
            pattern.emotion
        ));
    }

    let transitions = pattern.top_transitions(2);
    if !transitions.is_empty() {
        let listed: Vec<String> = transitions
            .iter()
            .map(|(e, n)| format!("{e} ({n}x)"))
            .collect();
        parts.push(format!(
            "From {} they most often moved to {}.",
            pattern.emotion,
            listed.join(" or ")
        ));
    }

    parts.join(" ")
}
