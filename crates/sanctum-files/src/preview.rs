//! Revocable handles to decrypted content held in memory for display.
//!
//! A `PreviewUrl` owns its registry entry: the plaintext is released when
//! the handle is revoked or dropped. `PreviewLoader` keeps at most one live
//! handle per UI slot and cancels superseded loads.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cipher::FileCipher;
use crate::error::{FileError, FileResult};
use crate::metadata::FileMetadata;
use crate::validate::normalize_mime;

#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub mime_type: String,
    pub data: Bytes,
}

/// In-memory table of live preview URLs.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Mutex<HashMap<String, PreviewEntry>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, data: Bytes, mime_type: &str) -> PreviewUrl {
        let url = format!("blob:sanctum/{}", uuid::Uuid::new_v4());
        self.lock().insert(
            url.clone(),
            PreviewEntry {
                mime_type: mime_type.to_string(),
                data,
            },
        );
        PreviewUrl {
            url,
            registry: self.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<PreviewEntry> {
        self.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            debug!(url, "preview revoked");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PreviewEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registered preview. Revokes on drop.
#[derive(Debug)]
pub struct PreviewUrl {
    url: String,
    registry: PreviewRegistry,
}

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn revoke(self) {
        drop(self)
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

struct Slot {
    generation: u64,
    cancel: CancellationToken,
    current: Option<PreviewUrl>,
}

/// One live preview per slot (message bubble, lightbox, ...).
pub struct PreviewLoader {
    cipher: Arc<FileCipher>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl PreviewLoader {
    pub fn new(cipher: Arc<FileCipher>) -> Self {
        Self {
            cipher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Decrypt `blob` into a preview for `slot`. Videos are probed first.
    pub async fn load(&self, slot: &str, blob: Bytes, metadata: &FileMetadata) -> FileResult<String> {
        let cipher = Arc::clone(&self.cipher);
        let metadata = metadata.clone();
        self.load_with(slot, async move {
            if normalize_mime(&metadata.mime_type).starts_with("video/") {
                cipher.create_video_preview_url(&blob, &metadata).await
            } else {
                cipher.create_preview_url(&blob, &metadata).await
            }
        })
        .await
    }

    /// Run `fetch` as the slot's current load. A newer load on the same
    /// slot cancels this one, which then returns `FileError::Cancelled`.
    pub async fn load_with<F>(&self, slot: &str, fetch: F) -> FileResult<String>
    where
        F: Future<Output = FileResult<PreviewUrl>>,
    {
        let (generation, cancel) = {
            let mut slots = self.lock();
            let entry = slots.entry(slot.to_string()).or_insert_with(|| Slot {
                generation: 0,
                cancel: CancellationToken::new(),
                current: None,
            });
            entry.cancel.cancel();
            entry.generation += 1;
            entry.cancel = CancellationToken::new();
            (entry.generation, entry.cancel.clone())
        };

        let url = tokio::select! {
            _ = cancel.cancelled() => return Err(FileError::Cancelled),
            res = fetch => res?,
        };

        let mut slots = self.lock();
        match slots.get_mut(slot) {
            Some(entry) if entry.generation == generation => {
                let out = url.as_str().to_string();
                // Replacing drops, and so revokes, the previous handle.
                entry.current = Some(url);
                Ok(out)
            }
            _ => Err(FileError::Cancelled),
        }
    }

    pub fn current(&self, slot: &str) -> Option<String> {
        self.lock()
            .get(slot)
            .and_then(|s| s.current.as_ref())
            .map(|u| u.as_str().to_string())
    }

    /// Cancel any in-flight load and revoke the slot's preview.
    pub fn release(&self, slot: &str) {
        if let Some(entry) = self.lock().remove(slot) {
            entry.cancel.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
