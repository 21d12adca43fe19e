//! File-level encryption: validate → thumbnail/probe → chunked AEAD.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use sanctum_core::config::FilesConfig;
use sanctum_crypto::{CryptoError, EncryptionManager, IV_SIZE, TAG_SIZE};
use tracing::{debug, info, warn};

use crate::error::{FileError, FileResult};
use crate::metadata::{DecryptedFile, EncryptedFile, FileInput, FileMetadata};
use crate::preview::{PreviewRegistry, PreviewUrl};
use crate::thumbnail;
use crate::validate::{normalize_mime, FilePolicy};
use crate::video::{self, VideoMetadata};

/// Progress callback: (bytes_done, bytes_total, file_name)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

pub struct FileCipher {
    manager: Arc<EncryptionManager>,
    policy: FilePolicy,
    registry: PreviewRegistry,
    chunk_size: usize,
    thumbnail_max_side: u32,
    thumbnail_quality: u8,
    video_probe_timeout: Duration,
    preview_probe_timeout: Duration,
}

impl FileCipher {
    pub fn new(manager: Arc<EncryptionManager>, cfg: &FilesConfig) -> Self {
        Self {
            manager,
            policy: FilePolicy::from_config(cfg),
            registry: PreviewRegistry::new(),
            chunk_size: cfg.chunk_size.max(1) as usize,
            thumbnail_max_side: cfg.thumbnail_max_side,
            thumbnail_quality: cfg.thumbnail_quality,
            video_probe_timeout: Duration::from_millis(cfg.video_probe_timeout_ms),
            preview_probe_timeout: Duration::from_millis(cfg.preview_probe_timeout_ms),
        }
    }

    pub fn manager(&self) -> &Arc<EncryptionManager> {
        &self.manager
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.policy
    }

    pub fn registry(&self) -> &PreviewRegistry {
        &self.registry
    }

    pub fn validate(&self, file: &FileInput) -> FileResult<()> {
        self.policy.validate(file)
    }

    /// `None` for non-image types. Decode failures are returned to the caller.
    pub async fn thumbnail(&self, file: &FileInput) -> FileResult<Option<String>> {
        if !normalize_mime(&file.mime_type).starts_with("image/") {
            return Ok(None);
        }
        thumbnail::generate(file.data.clone(), self.thumbnail_max_side, self.thumbnail_quality)
            .await
            .map(Some)
    }

    pub async fn extract_video_metadata(&self, file: &FileInput) -> VideoMetadata {
        video::extract(file.data.clone(), self.video_probe_timeout).await
    }

    pub async fn encrypt_file(
        &self,
        file: &FileInput,
        progress: Option<&ProgressFn>,
    ) -> FileResult<EncryptedFile> {
        self.validate(file)?;

        let thumbnail = match self.thumbnail(file).await {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file.name, error = %e, "thumbnail skipped");
                None
            }
        };

        let video = if normalize_mime(&file.mime_type).starts_with("video/") {
            self.extract_video_metadata(file).await
        } else {
            VideoMetadata::default()
        };

        let total = file.size();
        let mut sealer = self.manager.sealer()?;
        let mut blob = Vec::with_capacity(file.data.len() + (file.data.len() / self.chunk_size + 1) * 16);
        let mut done = 0u64;

        if file.data.is_empty() {
            blob.extend(sealer.seal_chunk(&[], true)?);
        } else {
            let mut chunks = file.data.chunks(self.chunk_size).peekable();
            while let Some(chunk) = chunks.next() {
                let last = chunks.peek().is_none();
                blob.extend(sealer.seal_chunk(chunk, last)?);
                done += chunk.len() as u64;
                if let Some(cb) = progress {
                    cb(done, total, &file.name);
                }
                tokio::task::yield_now().await;
            }
        }

        info!(file = %file.name, bytes = total, blob = blob.len(), "file encrypted");

        Ok(EncryptedFile {
            blob: Bytes::from(blob),
            metadata: FileMetadata {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size: total,
                iv: Some(STANDARD.encode(sealer.base_iv())),
                thumbnail,
                width: video.width,
                height: video.height,
                duration: video.duration,
                path: None,
                chunk_size: Some(self.chunk_size as u32),
            },
        })
    }

    pub async fn decrypt_file(
        &self,
        blob: &[u8],
        declared_type: &str,
        metadata: &FileMetadata,
    ) -> FileResult<DecryptedFile> {
        let iv = decode_iv(metadata.iv.as_deref().ok_or(FileError::MissingIv)?)?;

        if !declared_type.is_empty()
            && normalize_mime(declared_type) != normalize_mime(&metadata.mime_type)
        {
            warn!(
                declared = declared_type,
                recorded = %metadata.mime_type,
                "declared type differs from metadata, using metadata"
            );
        }

        let plain = match metadata.chunk_size {
            Some(chunk_size) => self.open_chunks(iv, blob, chunk_size as usize).await?,
            None => self.manager.open_detached(&iv, blob)?,
        };
        debug!(file = %metadata.name, bytes = plain.len(), "file decrypted");

        Ok(DecryptedFile {
            name: metadata.name.clone(),
            mime_type: metadata.mime_type.clone(),
            data: Bytes::from(plain),
        })
    }

    /// Chunk-by-chunk open, yielding between chunks so large blobs neither
    /// starve the runtime nor outlive a cancelled preview load.
    async fn open_chunks(&self, iv: [u8; IV_SIZE], blob: &[u8], chunk_size: usize) -> FileResult<Vec<u8>> {
        if chunk_size == 0 {
            return Err(CryptoError::Malformed("chunk size must be non-zero".into()).into());
        }
        let mut opener = self.manager.opener(iv)?;
        let mut out = Vec::with_capacity(blob.len());
        let mut chunks = blob.chunks(chunk_size + TAG_SIZE).peekable();
        if chunks.peek().is_none() {
            out.extend(opener.open_chunk(&[], true)?);
        }
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            out.extend(opener.open_chunk(chunk, last)?);
            tokio::task::yield_now().await;
        }
        Ok(out)
    }

    pub async fn create_preview_url(
        &self,
        blob: &[u8],
        metadata: &FileMetadata,
    ) -> FileResult<PreviewUrl> {
        let file = self.decrypt_file(blob, &metadata.mime_type, metadata).await?;
        Ok(self.registry.register(file.data, &file.mime_type))
    }

    /// Like `create_preview_url`, but refuses content that does not probe
    /// as a video container.
    pub async fn create_video_preview_url(
        &self,
        blob: &[u8],
        metadata: &FileMetadata,
    ) -> FileResult<PreviewUrl> {
        let file = self.decrypt_file(blob, &metadata.mime_type, metadata).await?;
        video::ensure_decodable(file.data.clone(), self.preview_probe_timeout).await?;
        Ok(self.registry.register(file.data, &file.mime_type))
    }
}

pub(crate) fn decode_iv(iv: &str) -> FileResult<[u8; IV_SIZE]> {
    let bytes = STANDARD
        .decode(iv)
        .map_err(|e| CryptoError::Malformed(format!("file IV is not base64: {e}")))?;
    let iv: [u8; IV_SIZE] = bytes
        .try_into()
        .map_err(|_| CryptoError::Malformed("file IV must be 12 bytes".into()))?;
    Ok(iv)
}
