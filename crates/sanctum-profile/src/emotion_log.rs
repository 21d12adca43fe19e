//! Batched, encrypted emotion-detection log.
//!
//! Producers push into a bounded channel; a background task writes batches
//! to the `emotion_logs` collection. Delivery is at-least-once: a batch that
//! fails to persist is kept and retried on the next tick, so a write that
//! failed after reaching the store may be duplicated. While a failed batch is
//! pending the task stops draining the channel, and producers see
//! backpressure (`try_log` → `QueueFull`, `log` waits).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sanctum_core::config::ProfileConfig;
use sanctum_core::Emotion;
use sanctum_crypto::{EncryptedMessage, EncryptionManager};
use sanctum_storage::DocumentStore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProfileError, ProfileResult};

pub const EMOTION_LOGS: &str = "emotion_logs";

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionSample {
    pub user_id: String,
    pub emotion: Emotion,
    pub confidence: f32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedEmotionSample {
    pub user_id: String,
    pub emotion: EncryptedMessage,
    pub confidence: f32,
    pub timestamp: u64,
}

impl SealedEmotionSample {
    pub fn open(&self, m: &EncryptionManager) -> ProfileResult<EmotionSample> {
        Ok(EmotionSample {
            user_id: self.user_id.clone(),
            emotion: m.decrypt(&self.emotion)?.parse()?,
            confidence: self.confidence,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogBatch {
    pub samples: Vec<SealedEmotionSample>,
}

pub struct EmotionLogQueue {
    manager: Arc<EncryptionManager>,
    tx: mpsc::Sender<SealedEmotionSample>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Vec<SealedEmotionSample>>>>,
}

impl EmotionLogQueue {
    /// Spawn the flush task. Must be called inside a Tokio runtime.
    pub fn start(manager: Arc<EncryptionManager>, docs: Arc<dyn DocumentStore>, cfg: &ProfileConfig) -> Self {
        let (tx, rx) = mpsc::channel(cfg.log_queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let flusher = Flusher {
            docs,
            rx,
            pending: Vec::new(),
            batch_size: cfg.log_batch_size.max(1),
        };
        let task = tokio::spawn(flusher.run(
            Duration::from_millis(cfg.log_flush_interval_ms.max(1)),
            cancel.clone(),
        ));
        Self {
            manager,
            tx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    fn seal(&self, sample: &EmotionSample) -> ProfileResult<SealedEmotionSample> {
        Ok(SealedEmotionSample {
            user_id: sample.user_id.clone(),
            emotion: self.manager.encrypt(sample.emotion.as_str())?,
            confidence: sample.confidence,
            timestamp: sample.timestamp,
        })
    }

    /// Enqueue without waiting.
    pub fn try_log(&self, sample: &EmotionSample) -> ProfileResult<()> {
        let sealed = self.seal(sample)?;
        self.tx.try_send(sealed).map_err(|e| match e {
            TrySendError::Full(_) => ProfileError::QueueFull,
            TrySendError::Closed(_) => ProfileError::QueueClosed,
        })
    }

    /// Enqueue, waiting for capacity.
    pub async fn log(&self, sample: &EmotionSample) -> ProfileResult<()> {
        let sealed = self.seal(sample)?;
        self.tx.send(sealed).await.map_err(|_| ProfileError::QueueClosed)
    }

    /// Stop the flush task after one final drain. Returns the samples that
    /// could not be delivered.
    pub async fn shutdown(&self) -> ProfileResult<Vec<SealedEmotionSample>> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return Ok(Vec::new());
        };
        self.cancel.cancel();
        let undelivered = task.await.map_err(|e| {
            ProfileError::Corrupt(format!("emotion log task failed: {e}"))
        })?;
        if !undelivered.is_empty() {
            warn!(count = undelivered.len(), "emotion log samples undelivered at shutdown");
        }
        Ok(undelivered)
    }
}

struct Flusher {
    docs: Arc<dyn DocumentStore>,
    rx: mpsc::Receiver<SealedEmotionSample>,
    pending: Vec<SealedEmotionSample>,
    batch_size: usize,
}

impl Flusher {
    async fn run(mut self, interval: Duration, cancel: CancellationToken) -> Vec<SealedEmotionSample> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let room = self.pending.len() < self.batch_size;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
                sample = self.rx.recv(), if room => match sample {
                    Some(sample) => {
                        self.pending.push(sample);
                        if self.pending.len() >= self.batch_size {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(sample) = self.rx.try_recv() {
            self.pending.push(sample);
        }
        while !self.pending.is_empty() {
            if !self.flush().await {
                break;
            }
        }
        info!(undelivered = self.pending.len(), "emotion log flusher stopped");
        self.pending
    }

    /// Write up to one batch. Returns false if the store rejected it.
    async fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        let n = self.pending.len().min(self.batch_size);
        let batch = LogBatch {
            samples: self.pending[..n].to_vec(),
        };
        let doc = match serde_json::to_value(&batch) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "dropping unserializable emotion log batch");
                self.pending.drain(..n);
                return true;
            }
        };
        let id = uuid::Uuid::new_v4().to_string();
        match self.docs.put_document(EMOTION_LOGS, &id, &doc).await {
            Ok(()) => {
                self.pending.drain(..n);
                debug!(batch = n, "emotion log batch written");
                true
            }
            Err(e) => {
                warn!(batch = n, retryable = e.is_retryable(), error = %e, "emotion log flush failed, keeping batch");
                false
            }
        }
    }
}
