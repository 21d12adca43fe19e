//! Blob and document store seams, with an OpenDAL-backed implementation.

use async_trait::async_trait;
use bytes::Bytes;
use opendal::Operator;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Opaque binary objects (encrypted file contents).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key` and return the storage path it landed at.
    async fn put_blob(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    async fn get_blob(&self, path: &str) -> StorageResult<Bytes>;
}

/// JSON documents addressed by collection and id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_document(&self, collection: &str, id: &str, doc: &Value) -> StorageResult<()>;

    /// `Ok(None)` when no document exists under `collection/id`.
    async fn get_document(&self, collection: &str, id: &str) -> StorageResult<Option<Value>>;
}

#[derive(Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn document_path(collection: &str, id: &str) -> StorageResult<String> {
        check_component(collection)?;
        check_component(id)?;
        Ok(format!("{collection}/{id}.json"))
    }
}

fn check_component(part: &str) -> StorageResult<()> {
    if part.is_empty() || part == "." || part == ".." || part.contains('/') {
        return Err(StorageError::InvalidKey(part.to_string()));
    }
    Ok(())
}

fn check_key(key: &str) -> StorageResult<()> {
    if key.starts_with('/') || key.ends_with('/') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    key.split('/').try_for_each(check_component)
}

#[async_trait]
impl BlobStore for OpendalStore {
    async fn put_blob(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        check_key(key)?;
        let len = data.len();
        self.op
            .write_with(key, data)
            .content_type(content_type)
            .await
            .map_err(|e| StorageError::from_opendal("write", key, e))?;
        tracing::debug!(key, bytes = len, "blob written");
        Ok(key.to_string())
    }

    async fn get_blob(&self, path: &str) -> StorageResult<Bytes> {
        check_key(path)?;
        let buf = self
            .op
            .read(path)
            .await
            .map_err(|e| StorageError::from_opendal("read", path, e))?;
        Ok(buf.to_bytes())
    }
}

#[async_trait]
impl DocumentStore for OpendalStore {
    async fn put_document(&self, collection: &str, id: &str, doc: &Value) -> StorageResult<()> {
        let path = Self::document_path(collection, id)?;
        let body = serde_json::to_vec(doc).map_err(|e| StorageError::Serialization {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.op
            .write_with(&path, body)
            .content_type("application/json")
            .await
            .map_err(|e| StorageError::from_opendal("write", &path, e))?;
        tracing::debug!(%path, "document written");
        Ok(())
    }

    async fn get_document(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        let path = Self::document_path(collection, id)?;
        let buf = match self.op.read(&path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::from_opendal("read", &path, e)),
        };
        let doc = serde_json::from_slice(&buf.to_bytes()).map_err(|e| {
            StorageError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(doc))
    }
}
