//! EncryptedProfileStore against an in-memory document store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sanctum_core::config::ProfileConfig;
use sanctum_core::Emotion;
use sanctum_crypto::{DerivedKey, EncryptionManager};
use sanctum_profile::{
    ConversationEntry, EncryptedProfileStore, ProfileError, UserAdaptiveProfile, UserInteraction,
    INTERACTIONS, PROFILES,
};
use sanctum_storage::{
    memory_operator, DocumentStore, OpendalStore, RetryPolicy, StorageError, StorageResult,
};
use serde_json::Value;

fn manager() -> Arc<EncryptionManager> {
    Arc::new(EncryptionManager::with_key(DerivedKey::from_bytes([0x5A; 32])))
}

fn docs() -> Arc<OpendalStore> {
    Arc::new(OpendalStore::new(memory_operator().unwrap()))
}

fn store_on(docs: Arc<OpendalStore>) -> EncryptedProfileStore {
    EncryptedProfileStore::new(manager(), docs, &ProfileConfig::default()).with_retry(RetryPolicy::none())
}

/// Memory store whose profile documents can be made unreadable, or whose
/// next N profile writes fail transiently.
struct FaultyDocs {
    inner: Arc<OpendalStore>,
    unreadable_profiles: AtomicBool,
    failing_profile_writes: AtomicUsize,
}

impl FaultyDocs {
    fn over(inner: Arc<OpendalStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            unreadable_profiles: AtomicBool::new(false),
            failing_profile_writes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentStore for FaultyDocs {
    async fn put_document(&self, collection: &str, id: &str, doc: &Value) -> StorageResult<()> {
        if collection == PROFILES
            && self
                .failing_profile_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StorageError::transient("write", id, "connection reset"));
        }
        self.inner.put_document(collection, id, doc).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        if collection == PROFILES && self.unreadable_profiles.load(Ordering::SeqCst) {
            return Err(StorageError::Persistence {
                op: "read",
                path: format!("{collection}/{id}"),
                retryable: false,
                reason: "access denied".into(),
            });
        }
        self.inner.get_document(collection, id).await
    }
}

fn interaction(user: &str, emotion: Emotion, ts: u64) -> UserInteraction {
    UserInteraction {
        user_id: user.into(),
        session_id: "session-1".into(),
        message: format!("entry {ts}: rough day at work"),
        detected_emotion: emotion,
        response_emotion: Emotion::Neutral,
        contextual_tags: Some(vec!["work".into()]),
        feedback_score: None,
        timestamp: ts,
    }
}

#[tokio::test]
async fn interactions_are_persisted_encrypted_and_readable() {
    let docs = docs();
    let store = store_on(Arc::clone(&docs));

    let id = store
        .record_interaction(interaction("alice", Emotion::Sad, 1))
        .await
        .unwrap();

    let raw = docs.get_document(INTERACTIONS, &id).await.unwrap().unwrap();
    let text = raw.to_string();
    assert!(!text.contains("rough day"));
    assert!(!text.contains("\"sad\""));
    assert_eq!(raw["userId"], "alice");
    assert_eq!(raw["timestamp"], 1);

    let back = store.read_interaction(&id).await.unwrap().unwrap();
    assert_eq!(back, interaction("alice", Emotion::Sad, 1));
    assert!(store.read_interaction("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn snapshot_is_written_every_fifth_interaction() {
    let docs = docs();
    let store = store_on(Arc::clone(&docs));

    for ts in 1..=4 {
        store
            .record_interaction(interaction("bob", Emotion::Happy, ts))
            .await
            .unwrap();
    }
    assert!(docs.get_document(PROFILES, "bob").await.unwrap().is_none());

    store
        .record_interaction(interaction("bob", Emotion::Happy, 5))
        .await
        .unwrap();
    let raw = docs.get_document(PROFILES, "bob").await.unwrap().unwrap();
    assert_eq!(raw["interactionCount"], 5);
    assert!(!raw.to_string().contains("rough day"));
}

#[tokio::test]
async fn adaptive_context_needs_three_observations() {
    let store = store_on(docs());
    store
        .record_interaction(interaction("carol", Emotion::Angry, 1))
        .await
        .unwrap();
    store
        .record_interaction(interaction("carol", Emotion::Angry, 2))
        .await
        .unwrap();

    let cold = store.get_adaptive_context("carol", Emotion::Angry).await.unwrap();
    assert_eq!(cold, sanctum_profile::context::default_context(Emotion::Angry));

    store
        .record_interaction(interaction("carol", Emotion::Angry, 3))
        .await
        .unwrap();
    store
        .add_user_feedback("carol", Emotion::Angry, "counting to ten", 5)
        .await
        .unwrap();

    let warm = store.get_adaptive_context("carol", Emotion::Angry).await.unwrap();
    assert!(warm.contains("angry in 3 of 3"), "{warm}");
    assert!(warm.contains("counting to ten"), "{warm}");
    assert!(warm.contains("angry (2x)"), "{warm}");
}

#[tokio::test]
async fn adaptive_context_for_uncached_user_uses_stored_patterns() {
    let docs = docs();
    let writer = store_on(Arc::clone(&docs));
    for ts in 1..=5 {
        writer
            .record_interaction(interaction("dave", Emotion::Fearful, ts))
            .await
            .unwrap();
    }

    let reader = store_on(docs);
    let text = reader.get_adaptive_context("dave", Emotion::Fearful).await.unwrap();
    assert!(text.contains("fearful in 5 of 5"), "{text}");
    assert!(reader.cached_profile("dave").await.is_none());
}

#[tokio::test]
async fn feedback_validation_and_persistence() {
    let docs = docs();
    let store = store_on(Arc::clone(&docs));

    for bad in [0u8, 6] {
        assert!(matches!(
            store.add_user_feedback("erin", Emotion::Sad, "x", bad).await,
            Err(ProfileError::InvalidFeedback(s)) if s == bad
        ));
    }

    for i in 0..12 {
        store
            .add_user_feedback("erin", Emotion::Sad, &format!("approach-{i}"), 4)
            .await
            .unwrap();
    }
    store
        .add_user_feedback("erin", Emotion::Sad, "lecture", 1)
        .await
        .unwrap();

    let profile = store.load_profile("erin").await.unwrap().unwrap();
    let pattern = &profile.emotional_patterns[&Emotion::Sad];
    assert_eq!(pattern.effective_approaches.len(), 10);
    assert_eq!(pattern.effective_approaches[0], "approach-2");
    assert_eq!(pattern.effective_approaches[9], "approach-11");
    assert!(!pattern.effective_approaches.contains(&"lecture".to_string()));
    assert_eq!(pattern.feedback_count, 13);

    // Persisted on every feedback call.
    assert!(docs.get_document(PROFILES, "erin").await.unwrap().is_some());
}

#[tokio::test]
async fn profile_roundtrip_truncates_history_to_fifty() {
    let store = store_on(docs());
    let mut profile = UserAdaptiveProfile::new("frank");
    for ts in 1..=120 {
        profile.observe(&interaction("frank", Emotion::Surprised, ts), 100);
    }
    assert_eq!(profile.conversation_history.len(), 100);

    let sealed = store.encrypt_user_profile(&profile).unwrap();
    let back = store.decrypt_user_profile(&sealed).unwrap();

    let expected: Vec<ConversationEntry> = profile.conversation_history[50..].to_vec();
    assert_eq!(back.conversation_history, expected);
    assert_eq!(back.conversation_history[0].timestamp, 71);

    let mut rest = back.clone();
    rest.conversation_history = profile.conversation_history.clone();
    assert_eq!(rest, profile);
}

#[tokio::test]
async fn short_history_roundtrips_exactly() {
    let store = store_on(docs());
    let mut profile = UserAdaptiveProfile::new("gina");
    for ts in 1..=7 {
        profile.observe(&interaction("gina", Emotion::Happy, ts), 100);
    }
    profile.apply_feedback(Emotion::Happy, "humour", 5, 10);
    let back = store
        .decrypt_user_profile(&store.encrypt_user_profile(&profile).unwrap())
        .unwrap();
    assert_eq!(back, profile);
}

#[tokio::test]
async fn load_profile_prefers_the_copy_with_more_interactions() {
    let docs = docs();
    let old_session = store_on(Arc::clone(&docs));
    for ts in 1..=10 {
        old_session
            .record_interaction(interaction("hana", Emotion::Neutral, ts))
            .await
            .unwrap();
    }

    // A fresh session seeds from the stored snapshot and keeps counting.
    let new_session = store_on(Arc::clone(&docs));
    new_session
        .record_interaction(interaction("hana", Emotion::Happy, 11))
        .await
        .unwrap();
    let merged = new_session.load_profile("hana").await.unwrap().unwrap();
    assert_eq!(merged.interaction_count, 11);

    // Stored snapshot (10) is older than live (11): live wins.
    assert_eq!(merged.last_emotion, Some(Emotion::Happy));

    assert!(new_session.load_profile("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn stored_snapshot_replaces_stale_live_copy() {
    let docs = docs();
    let reader = store_on(Arc::clone(&docs));
    reader
        .record_interaction(interaction("ivan", Emotion::Sad, 1))
        .await
        .unwrap();

    let writer = store_on(Arc::clone(&docs));
    writer.load_profile("ivan").await.unwrap();
    for ts in 1..=10 {
        writer
            .record_interaction(interaction("ivan", Emotion::Happy, ts))
            .await
            .unwrap();
    }

    let merged = reader.load_profile("ivan").await.unwrap().unwrap();
    assert_eq!(merged.interaction_count, 10);
    assert_eq!(reader.cached_profile("ivan").await.unwrap().interaction_count, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_interactions_lose_no_updates() {
    let store = Arc::new(store_on(docs()));
    let mut tasks = Vec::new();
    for t in 0..8u64 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            for i in 0..5u64 {
                store
                    .record_interaction(interaction("judy", Emotion::Sad, t * 100 + i + 1))
                    .await
                    .unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let profile = store.cached_profile("judy").await.unwrap();
    assert_eq!(profile.interaction_count, 40);
    assert_eq!(profile.emotional_patterns[&Emotion::Sad].frequency, 40);
    assert_eq!(profile.preferred_topics["work"], 40);
    assert_eq!(profile.conversation_history.len(), 40);
}

#[tokio::test]
async fn profile_from_another_key_is_rejected() {
    let docs = docs();
    let store = store_on(Arc::clone(&docs));
    for ts in 1..=5 {
        store
            .record_interaction(interaction("kim", Emotion::Happy, ts))
            .await
            .unwrap();
    }

    let other_key = Arc::new(EncryptionManager::with_key(DerivedKey::from_bytes([0x11; 32])));
    let stranger = EncryptedProfileStore::new(other_key, docs, &ProfileConfig::default());
    assert!(matches!(
        stranger.load_profile("kim").await,
        Err(ProfileError::Crypto(_))
    ));
}

#[tokio::test]
async fn unreadable_snapshot_fails_instead_of_starting_fresh() {
    let docs = docs();
    let first = store_on(Arc::clone(&docs));
    for ts in 1..=20 {
        first
            .record_interaction(interaction("lena", Emotion::Sad, ts))
            .await
            .unwrap();
    }

    let faulty = FaultyDocs::over(Arc::clone(&docs));
    faulty.unreadable_profiles.store(true, Ordering::SeqCst);
    let second = EncryptedProfileStore::new(manager(), faulty.clone(), &ProfileConfig::default())
        .with_retry(RetryPolicy::none());

    for ts in 21..=25 {
        let err = second
            .record_interaction(interaction("lena", Emotion::Happy, ts))
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Persistence(_)), "{err}");
        assert!(!err.is_retryable());
    }
    assert!(matches!(
        second.add_user_feedback("lena", Emotion::Sad, "walk", 4).await,
        Err(ProfileError::Persistence(_))
    ));
    assert!(second.cached_profile("lena").await.is_none());

    let raw = docs.get_document(PROFILES, "lena").await.unwrap().unwrap();
    assert_eq!(raw["interactionCount"], 20);

    faulty.unreadable_profiles.store(false, Ordering::SeqCst);
    second
        .record_interaction(interaction("lena", Emotion::Happy, 21))
        .await
        .unwrap();
    assert_eq!(second.cached_profile("lena").await.unwrap().interaction_count, 21);
}

#[tokio::test]
async fn failed_snapshot_write_is_retryable_and_applied_once() {
    let docs = docs();
    let faulty = FaultyDocs::over(Arc::clone(&docs));
    let store = EncryptedProfileStore::new(manager(), faulty.clone(), &ProfileConfig::default())
        .with_retry(RetryPolicy::none());

    for ts in 1..=4 {
        store
            .record_interaction(interaction("mona", Emotion::Sad, ts))
            .await
            .unwrap();
    }

    faulty.failing_profile_writes.store(1, Ordering::SeqCst);
    let fifth = interaction("mona", Emotion::Sad, 5);
    let err = store.record_interaction(fifth.clone()).await.unwrap_err();
    assert!(matches!(err, ProfileError::Persistence(_)), "{err}");
    assert!(err.is_retryable());

    let unchanged = store.cached_profile("mona").await.unwrap();
    assert_eq!(unchanged.interaction_count, 4);
    assert!(docs.get_document(PROFILES, "mona").await.unwrap().is_none());

    store.record_interaction(fifth).await.unwrap();
    let profile = store.cached_profile("mona").await.unwrap();
    assert_eq!(profile.interaction_count, 5);
    assert_eq!(profile.emotional_patterns[&Emotion::Sad].frequency, 5);
    assert_eq!(profile.conversation_history.len(), 5);

    let raw = docs.get_document(PROFILES, "mona").await.unwrap().unwrap();
    assert_eq!(raw["interactionCount"], 5);
}

#[tokio::test]
async fn failed_feedback_write_leaves_profile_untouched() {
    let faulty = FaultyDocs::over(docs());
    let store = EncryptedProfileStore::new(manager(), faulty.clone(), &ProfileConfig::default())
        .with_retry(RetryPolicy::none());
    store
        .add_user_feedback("nico", Emotion::Angry, "breathing", 5)
        .await
        .unwrap();

    faulty.failing_profile_writes.store(1, Ordering::SeqCst);
    let err = store
        .add_user_feedback("nico", Emotion::Angry, "venting", 3)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let profile = store.cached_profile("nico").await.unwrap();
    let pattern = &profile.emotional_patterns[&Emotion::Angry];
    assert_eq!(pattern.feedback_count, 1);
    assert_eq!(pattern.effective_approaches, vec!["breathing".to_string()]);
}
