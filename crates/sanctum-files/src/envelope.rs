//! Chat attachments: random storage names, encrypted original names, access
//! tokens, and the upload/download paths through a `BlobStore`.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sanctum_core::config::FilesConfig;
use sanctum_crypto::EncryptedMessage;
use sanctum_storage::{retry_with_backoff, BlobStore, RetryPolicy, UrlSigner};
use tracing::{debug, info};

use crate::cipher::{FileCipher, ProgressFn};
use crate::error::{FileError, FileResult};
use crate::metadata::{DecryptedFile, FileInput, FileMetadata, ProcessedFile, SecureFileMetadata};

const ACCESS_TOKEN_BYTES: usize = 32;
const MAX_EXTENSION_LEN: usize = 10;

pub struct SecureFileEnvelope {
    cipher: Arc<FileCipher>,
    bucket: String,
    prefix: String,
    retry: RetryPolicy,
}

impl SecureFileEnvelope {
    pub fn new(cipher: Arc<FileCipher>, cfg: &FilesConfig, bucket: impl Into<String>) -> Self {
        Self {
            cipher,
            bucket: bucket.into(),
            prefix: cfg.attachment_prefix.trim_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cipher(&self) -> &Arc<FileCipher> {
        &self.cipher
    }

    /// Rename to a random storage name, encrypt the original name, and mint
    /// an access token. Nothing is written to storage.
    pub fn process_file(&self, file: FileInput) -> FileResult<ProcessedFile> {
        let storage_name = storage_name(&file.name);
        let encrypted_name = self.cipher.manager().encrypt(&file.name)?;
        let original_name = encrypted_name.to_json()?;

        let metadata = SecureFileMetadata {
            file_name: Some(storage_name.clone()),
            original_name: Some(original_name),
            mime_type: file.mime_type.clone(),
            size: file.size(),
            access_token: access_token(),
            ..Default::default()
        };
        debug!(storage_name = %storage_name, "attachment renamed");

        Ok(ProcessedFile {
            file: FileInput {
                name: storage_name,
                ..file
            },
            metadata,
        })
    }

    /// Check metadata completeness, then ask the signer for a retrieval URL.
    pub async fn validate_access(
        &self,
        metadata: &SecureFileMetadata,
        signer: &dyn UrlSigner,
    ) -> FileResult<String> {
        let storage_url = require_complete(metadata)?;
        Ok(signer.sign_url(storage_url, &self.bucket).await?)
    }

    pub async fn generate_thumbnail(&self, file: &FileInput) -> FileResult<Option<String>> {
        self.cipher.thumbnail(file).await
    }

    /// Decrypt the double-encoded `originalName`.
    pub fn original_name(&self, metadata: &SecureFileMetadata) -> FileResult<String> {
        let encoded = non_empty(&metadata.original_name, "originalName")?;
        let msg = EncryptedMessage::from_json(encoded)?;
        Ok(self.cipher.manager().decrypt(&msg)?)
    }

    /// validate → process → encrypt → store. Returns metadata with `storageUrl` set.
    pub async fn upload(
        &self,
        store: &dyn BlobStore,
        file: FileInput,
        progress: Option<&ProgressFn>,
    ) -> FileResult<SecureFileMetadata> {
        self.cipher.validate(&file)?;
        let ProcessedFile { file, mut metadata } = self.process_file(file)?;
        let encrypted = self.cipher.encrypt_file(&file, progress).await?;

        let key = if self.prefix.is_empty() {
            file.name.clone()
        } else {
            format!("{}/{}", self.prefix, file.name)
        };
        let blob = encrypted.blob;
        let path = retry_with_backoff(&self.retry, "put_blob", || {
            store.put_blob(&key, blob.clone(), "application/octet-stream")
        })
        .await?;

        let fm = encrypted.metadata;
        metadata.iv = fm.iv;
        metadata.chunk_size = fm.chunk_size;
        metadata.thumbnail = fm.thumbnail;
        metadata.width = fm.width;
        metadata.height = fm.height;
        metadata.duration = fm.duration;
        metadata.storage_url = Some(path);

        info!(path = ?metadata.storage_url, bytes = metadata.size, "attachment uploaded");
        Ok(metadata)
    }

    pub async fn download(
        &self,
        store: &dyn BlobStore,
        metadata: &SecureFileMetadata,
    ) -> FileResult<DecryptedFile> {
        let storage_url = require_complete(metadata)?;
        let name = self.original_name(metadata)?;
        let blob = retry_with_backoff(&self.retry, "get_blob", || store.get_blob(storage_url)).await?;

        let fm = FileMetadata {
            name,
            mime_type: metadata.mime_type.clone(),
            size: metadata.size,
            iv: metadata.iv.clone(),
            thumbnail: None,
            width: metadata.width,
            height: metadata.height,
            duration: metadata.duration,
            path: Some(storage_url.to_string()),
            chunk_size: metadata.chunk_size,
        };
        self.cipher.decrypt_file(&blob, &metadata.mime_type, &fm).await
    }
}

fn non_empty<'a>(field: &'a Option<String>, name: &'static str) -> FileResult<&'a str> {
    match field.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FileError::InvalidMetadata(name)),
    }
}

fn require_complete(metadata: &SecureFileMetadata) -> FileResult<&str> {
    non_empty(&metadata.file_name, "fileName")?;
    non_empty(&metadata.original_name, "originalName")?;
    non_empty(&metadata.storage_url, "storageUrl")
}

/// `{uuid}{.ext}`; the extension survives only if it is 1-10 ASCII alphanumerics.
pub fn storage_name(original: &str) -> String {
    let id = uuid::Uuid::new_v4();
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| {
            (1..=MAX_EXTENSION_LEN).contains(&e.len())
                && e.bytes().all(|b| b.is_ascii_alphanumeric())
        });
    match ext {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
