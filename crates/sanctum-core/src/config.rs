use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::LogFormat;

/// Top-level configuration (loaded from sanctum.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SanctumConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
    pub files: FilesConfig,
    pub profile: ProfileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

/// Key derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// KDF algorithm: "pbkdf2" (browser-compatible) or "argon2id"
    pub kdf: String,
    /// PBKDF2-HMAC-SHA256 iterations (minimum 100000)
    pub pbkdf2_iterations: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Environment variable holding the master passphrase
    pub password_env: String,
    /// Environment variable holding the KDF salt
    pub salt_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding encrypted blobs and documents
    pub bucket: String,
    /// Key prefix inside the bucket
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Lifetime of presigned download URLs
    pub signed_url_ttl_secs: u64,
    /// Attempts per store call before a retryable error is surfaced
    pub retry_max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Upload size ceiling in bytes (default: 50 MiB)
    pub max_file_bytes: u64,
    /// Accepted MIME types; `type/*` matches a whole top-level type
    pub allowed_mime_types: Vec<String>,
    /// Plaintext bytes per AEAD chunk
    pub chunk_size: u32,
    /// Longest thumbnail side in pixels
    pub thumbnail_max_side: u32,
    /// Thumbnail JPEG quality (1-100)
    pub thumbnail_quality: u8,
    /// Budget for best-effort video metadata extraction
    pub video_probe_timeout_ms: u64,
    /// Budget for the decodability check before a video preview is handed out
    pub preview_probe_timeout_ms: u64,
    /// Key prefix for chat attachments
    pub attachment_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Persist a full profile snapshot every N interactions
    pub snapshot_interval: u64,
    /// Observations needed before a pattern drives the adaptive context
    pub min_observations: u32,
    /// In-memory conversation history window
    pub history_window: usize,
    /// History entries kept in an encrypted snapshot
    pub snapshot_history_limit: usize,
    /// Emotion-log queue capacity
    pub log_queue_capacity: usize,
    /// Max samples written per emotion-log batch
    pub log_batch_size: usize,
    /// Emotion-log flush interval
    pub log_flush_interval_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf: "pbkdf2".into(),
            pbkdf2_iterations: 100_000,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            password_env: "SANCTUM_MASTER_PASSWORD".into(),
            salt_env: "SANCTUM_KEY_SALT".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "sanctum".into(),
            prefix: "".into(),
            enforce_tls: false,
            signed_url_ttl_secs: 3600,
            retry_max_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }
}

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * 1024 * 1024,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chunk_size: 1024 * 1024,
            thumbnail_max_side: 200,
            thumbnail_quality: 70,
            video_probe_timeout_ms: 5_000,
            preview_probe_timeout_ms: 10_000,
            attachment_prefix: "attachments".into(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 5,
            min_observations: 3,
            history_window: 100,
            snapshot_history_limit: 50,
            log_queue_capacity: 256,
            log_batch_size: 32,
            log_flush_interval_ms: 2_000,
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub async fn load_config(path: &Path) -> anyhow::Result<SanctumConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    } else {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        Ok(SanctumConfig::default())
    }
}
