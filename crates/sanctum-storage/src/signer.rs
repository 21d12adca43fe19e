use std::time::Duration;

use async_trait::async_trait;
use opendal::Operator;

use crate::error::{StorageError, StorageResult};

/// Issues time-limited retrieval URLs for stored blobs.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign_url(&self, path: &str, bucket: &str) -> StorageResult<String>;
}

/// Presigned S3 GETs for a single bucket.
#[derive(Clone)]
pub struct PresignSigner {
    op: Operator,
    bucket: String,
    ttl: Duration,
}

impl PresignSigner {
    pub fn new(op: Operator, bucket: impl Into<String>, ttl: Duration) -> Self {
        Self {
            op,
            bucket: bucket.into(),
            ttl,
        }
    }
}

#[async_trait]
impl UrlSigner for PresignSigner {
    async fn sign_url(&self, path: &str, bucket: &str) -> StorageResult<String> {
        if bucket != self.bucket {
            return Err(StorageError::UnknownBucket {
                requested: bucket.to_string(),
                configured: self.bucket.clone(),
            });
        }
        let req = self
            .op
            .presign_read(path, self.ttl)
            .await
            .map_err(|e| StorageError::from_opendal("presign", path, e))?;
        Ok(req.uri().to_string())
    }
}
