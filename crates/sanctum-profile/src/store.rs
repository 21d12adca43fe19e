//! EncryptedProfileStore: per-user adaptive profiles kept decrypted in
//! memory and persisted field-encrypted through a `DocumentStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sanctum_core::config::ProfileConfig;
use sanctum_core::Emotion;
use sanctum_crypto::EncryptionManager;
use sanctum_storage::{retry_with_backoff, DocumentStore, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::context;
use crate::error::{ProfileError, ProfileResult};
use crate::model::{UserAdaptiveProfile, UserInteraction};
use crate::sealed::{self, EncryptedUserAdaptiveProfile, EncryptedUserInteraction};

pub const INTERACTIONS: &str = "user_interactions";
pub const PROFILES: &str = "user_profiles";

const MAX_EFFECTIVE_APPROACHES: usize = 10;

type ProfileSlot = Arc<tokio::sync::Mutex<UserAdaptiveProfile>>;

pub struct EncryptedProfileStore {
    manager: Arc<EncryptionManager>,
    docs: Arc<dyn DocumentStore>,
    cfg: ProfileConfig,
    retry: RetryPolicy,
    profiles: Mutex<HashMap<String, ProfileSlot>>,
}

impl EncryptedProfileStore {
    pub fn new(manager: Arc<EncryptionManager>, docs: Arc<dyn DocumentStore>, cfg: &ProfileConfig) -> Self {
        Self {
            manager,
            docs,
            cfg: cfg.clone(),
            retry: RetryPolicy::default(),
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Encrypt and persist one interaction, then fold it into the user's
    /// profile. Returns the interaction's document id.
    ///
    /// The live profile changes only once every write has succeeded, so a
    /// failed call leaves no trace in memory and can be retried as is.
    pub async fn record_interaction(&self, interaction: UserInteraction) -> ProfileResult<String> {
        let sealed = sealed::seal_interaction(&self.manager, &interaction)?;
        let slot = self.slot(&interaction.user_id).await?;
        let mut profile = slot.lock().await;

        let mut next = profile.clone();
        next.observe(&interaction, self.cfg.history_window);
        let interval = self.cfg.snapshot_interval.max(1);
        if next.interaction_count % interval == 0 {
            self.persist_snapshot(&next).await?;
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.put(INTERACTIONS, &id, &sealed).await?;
        *profile = next;
        debug!(
            user = %interaction.user_id,
            count = profile.interaction_count,
            "interaction recorded"
        );
        Ok(id)
    }

    pub async fn add_user_feedback(
        &self,
        user_id: &str,
        emotion: Emotion,
        approach: &str,
        score: u8,
    ) -> ProfileResult<()> {
        if !(1..=5).contains(&score) {
            return Err(ProfileError::InvalidFeedback(score));
        }
        let slot = self.slot(user_id).await?;
        let mut profile = slot.lock().await;
        let mut next = profile.clone();
        next.apply_feedback(emotion, approach, score, MAX_EFFECTIVE_APPROACHES);
        self.persist_snapshot(&next).await?;
        *profile = next;
        Ok(())
    }

    pub async fn get_adaptive_context(&self, user_id: &str, current: Emotion) -> ProfileResult<String> {
        let cached = self.cached(user_id);
        let (pattern, total) = match cached {
            Some(slot) => {
                let profile = slot.lock().await;
                (
                    profile.emotional_patterns.get(&current).cloned(),
                    profile.interaction_count,
                )
            }
            None => match self.fetch_sealed_profile(user_id).await? {
                Some(sealed) => {
                    let mut patterns = sealed::open_patterns(&self.manager, &sealed)?;
                    (patterns.remove(&current), sealed.interaction_count)
                }
                None => (None, 0),
            },
        };

        Ok(match pattern {
            Some(p) if p.frequency >= self.cfg.min_observations => context::compose(&p, total),
            _ => context::default_context(current).to_string(),
        })
    }

    pub fn encrypt_user_profile(&self, profile: &UserAdaptiveProfile) -> ProfileResult<EncryptedUserAdaptiveProfile> {
        sealed::seal_profile(&self.manager, profile, self.cfg.snapshot_history_limit)
    }

    pub fn decrypt_user_profile(&self, sealed: &EncryptedUserAdaptiveProfile) -> ProfileResult<UserAdaptiveProfile> {
        sealed::open_profile(&self.manager, sealed)
    }

    /// Fetch the stored snapshot and merge it with the live profile: the copy
    /// with more interactions wins, ties keep the live copy.
    pub async fn load_profile(&self, user_id: &str) -> ProfileResult<Option<UserAdaptiveProfile>> {
        let stored = match self.fetch_sealed_profile(user_id).await? {
            Some(sealed) => Some(self.decrypt_user_profile(&sealed)?),
            None => None,
        };

        let slot = match (self.cached(user_id), stored) {
            (Some(slot), Some(stored)) => {
                let mut live = slot.lock().await;
                if stored.interaction_count > live.interaction_count {
                    info!(user = user_id, "stored profile is newer, replacing live copy");
                    *live = stored;
                }
                return Ok(Some(live.clone()));
            }
            (Some(slot), None) => slot,
            (None, Some(stored)) => self.install(user_id, stored),
            (None, None) => return Ok(None),
        };
        let profile = slot.lock().await;
        Ok(Some(profile.clone()))
    }

    pub async fn read_interaction(&self, id: &str) -> ProfileResult<Option<UserInteraction>> {
        match self.get::<EncryptedUserInteraction>(INTERACTIONS, id).await? {
            Some(sealed) => Ok(Some(sealed::open_interaction(&self.manager, &sealed)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of the in-memory profile, if the user is cached.
    pub async fn cached_profile(&self, user_id: &str) -> Option<UserAdaptiveProfile> {
        let slot = self.cached(user_id)?;
        let profile = slot.lock().await;
        Some(profile.clone())
    }

    async fn persist_snapshot(&self, profile: &UserAdaptiveProfile) -> ProfileResult<()> {
        let sealed = self.encrypt_user_profile(profile)?;
        self.put(PROFILES, &profile.user_id, &sealed).await?;
        debug!(user = %profile.user_id, count = profile.interaction_count, "profile snapshot persisted");
        Ok(())
    }

    async fn fetch_sealed_profile(&self, user_id: &str) -> ProfileResult<Option<EncryptedUserAdaptiveProfile>> {
        self.get(PROFILES, user_id).await
    }

    /// The user's cache slot, seeded from the stored snapshot on first use.
    async fn slot(&self, user_id: &str) -> ProfileResult<ProfileSlot> {
        if let Some(slot) = self.cached(user_id) {
            return Ok(slot);
        }
        let seed = match self.fetch_sealed_profile(user_id).await? {
            Some(sealed) => self.decrypt_user_profile(&sealed)?,
            None => UserAdaptiveProfile::new(user_id),
        };
        Ok(self.install(user_id, seed))
    }

    fn cached(&self, user_id: &str) -> Option<ProfileSlot> {
        self.lock().get(user_id).cloned()
    }

    /// Insert unless another task got there first.
    fn install(&self, user_id: &str, profile: UserAdaptiveProfile) -> ProfileSlot {
        self.lock()
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(profile)))
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProfileSlot>> {
        self.profiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn put<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> ProfileResult<()> {
        let doc = serde_json::to_value(record).map_err(|e| ProfileError::Corrupt(e.to_string()))?;
        retry_with_backoff(&self.retry, collection, || {
            self.docs.put_document(collection, id, &doc)
        })
        .await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> ProfileResult<Option<T>> {
        let doc = retry_with_backoff(&self.retry, collection, || self.docs.get_document(collection, id)).await?;
        doc.map(|v| {
            serde_json::from_value(v).map_err(|e| ProfileError::Corrupt(format!("{collection}/{id}: {e}")))
        })
        .transpose()
    }
}
