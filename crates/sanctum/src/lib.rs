//! sanctum: one encryption session, fully wired
//!
//! Usage:
//!   let session = Sanctum::bootstrap(Path::new("/etc/sanctum/sanctum.toml")).await?;
//!   let meta = session.files.upload(session.blobs(), file, None).await?;
//!
//! Bootstrap order: config → logging → key derivation (password and salt
//! from the environment) → S3 operator → stores → components.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use opendal::Operator;
use sanctum_core::config::{load_config, SanctumConfig};
use sanctum_core::logging;
use sanctum_crypto::{EncryptionManager, MasterSecret};
use sanctum_files::{FileCipher, PreviewLoader, SecureFileEnvelope};
use sanctum_profile::{EmotionLogQueue, EncryptedProfileStore};
use sanctum_storage::{
    build_operator, BlobStore, OpendalStore, PresignSigner, RetryPolicy, S3Credentials, UrlSigner,
};
use tracing::{debug, info};

pub struct Sanctum {
    pub config: SanctumConfig,
    pub manager: Arc<EncryptionManager>,
    pub cipher: Arc<FileCipher>,
    pub files: SecureFileEnvelope,
    pub previews: PreviewLoader,
    pub profiles: EncryptedProfileStore,
    pub emotion_log: EmotionLogQueue,
    store: Arc<OpendalStore>,
    signer: PresignSigner,
}

impl Sanctum {
    /// Load config from `path`, install logging, derive the session key, and
    /// connect to the configured S3 bucket.
    pub async fn bootstrap(path: &Path) -> Result<Self> {
        let config = load_config(path).await?;
        if let Err(e) = logging::init_from_config(&config.logging) {
            debug!(error = %e, "tracing subscriber already installed");
        }
        info!(
            version = env!("CARGO_PKG_VERSION"),
            config = %path.display(),
            "sanctum starting"
        );

        let secret = MasterSecret::from_env(&config.crypto).context("loading master secret")?;
        let manager = EncryptionManager::initialize_with(&config.crypto, &secret)
            .await
            .context("deriving session key")?;

        let creds = S3Credentials::from_env()?;
        let op = build_operator(&config.storage, &creds)?;
        Ok(Self::assemble(config, Arc::new(manager), op))
    }

    /// Wire components around an already-initialized manager and operator.
    pub fn assemble(config: SanctumConfig, manager: Arc<EncryptionManager>, op: Operator) -> Self {
        let store = Arc::new(OpendalStore::new(op.clone()));
        let retry = RetryPolicy::from_config(&config.storage);
        let signer = PresignSigner::new(
            op,
            config.storage.bucket.clone(),
            Duration::from_secs(config.storage.signed_url_ttl_secs),
        );

        let cipher = Arc::new(FileCipher::new(Arc::clone(&manager), &config.files));
        let files = SecureFileEnvelope::new(Arc::clone(&cipher), &config.files, config.storage.bucket.clone())
            .with_retry(retry.clone());
        let previews = PreviewLoader::new(Arc::clone(&cipher));
        let profiles = EncryptedProfileStore::new(Arc::clone(&manager), store.clone(), &config.profile)
            .with_retry(retry);
        let emotion_log = EmotionLogQueue::start(Arc::clone(&manager), store.clone(), &config.profile);

        Self {
            config,
            manager,
            cipher,
            files,
            previews,
            profiles,
            emotion_log,
            store,
            signer,
        }
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.store.as_ref()
    }

    pub fn signer(&self) -> &dyn UrlSigner {
        &self.signer
    }

    /// Flush the emotion log. Returns how many samples could not be delivered.
    pub async fn shutdown(&self) -> Result<usize> {
        let undelivered = self.emotion_log.shutdown().await?;
        info!(undelivered = undelivered.len(), "sanctum stopped");
        Ok(undelivered.len())
    }
}
