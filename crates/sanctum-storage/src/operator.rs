//! OpenDAL Operator factory for sanctum storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use sanctum_core::config::StorageConfig;
use secrecy::{ExposeSecret, SecretString};

/// S3 credentials, loaded from the environment
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    /// Reads `SANCTUM_ACCESS_KEY_ID` / `SANCTUM_SECRET_ACCESS_KEY`, falling
    /// back to the standard `AWS_*` variables.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("SANCTUM_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
            .context("no S3 access key id in SANCTUM_ACCESS_KEY_ID or AWS_ACCESS_KEY_ID")?;
        let secret = std::env::var("SANCTUM_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
            .context("no S3 secret in SANCTUM_SECRET_ACCESS_KEY or AWS_SECRET_ACCESS_KEY")?;
        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret),
        })
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint.
///
/// Uses path-style addressing (the opendal default), which MinIO and
/// SeaweedFS require. If `enforce_tls` is set and the endpoint is plain
/// HTTP this fails; otherwise a warning is logged.
pub fn build_operator(storage: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; set storage.enforce_tls = true in production"
        );
    }

    let mut builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(creds.secret_access_key.expose_secret());
    if !storage.prefix.is_empty() {
        builder = builder.root(&format!("/{}", storage.prefix.trim_matches('/')));
    }

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(storage.retry_max_attempts.max(1) as usize)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// In-memory operator for tests and local development.
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating in-memory OpenDAL operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish())
}
