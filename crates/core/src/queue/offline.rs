//! File-backed offline queue.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Delivery, DrainReport, QueueConfig, QueueError, QueueReason, QueueRecord};
use crate::dispatch::DispatchItem;
use crate::metrics;

/// Durable store for undeliverable items, keyed by fingerprint.
///
/// The in-memory copy is the source of truth between writes; the file is
/// replaced atomically on every change. The mutex is held per record, so a
/// long drain never starves a concurrent append.
pub struct OfflineQueue {
    path: PathBuf,
    retention: chrono::Duration,
    records: Mutex<Vec<QueueRecord>>,
}

impl OfflineQueue {
    /// Load the queue file, or start empty if it does not exist.
    ///
    /// A leftover temporary file from an interrupted write is discarded; a
    /// queue file that cannot be parsed is an error, never silently reset.
    pub async fn open(path: impl Into<PathBuf>, retention_hours: u64) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = tmp_path(&path);
        if tokio::fs::try_exists(&tmp).await? {
            warn!(path = %tmp.display(), "Discarding partial queue write from a previous run");
            tokio::fs::remove_file(&tmp).await?;
        }

        let records = load(&path).await?;
        info!(path = %path.display(), records = records.len(), "Offline queue loaded");
        metrics::QUEUE_DEPTH.set(records.len() as i64);

        Ok(Self {
            path,
            retention: chrono::Duration::hours(retention_hours as i64),
            records: Mutex::new(records),
        })
    }

    pub async fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::open(&config.path, config.retention_hours).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or update a record. The fingerprint stays unique in the queue.
    pub async fn append(&self, record: QueueRecord) -> Result<(), QueueError> {
        self.append_all(vec![record]).await
    }

    /// Insert or update several records with a single write.
    pub async fn append_all(&self, new_records: Vec<QueueRecord>) -> Result<(), QueueError> {
        if new_records.is_empty() {
            return Ok(());
        }
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        for record in new_records {
            debug!(fingerprint = %record.fingerprint(), reason = %record.reason, "Queueing item");
            upsert(&mut next, record);
        }
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    /// Remove a record. Returns whether it was present.
    pub async fn remove(&self, fingerprint: &str) -> Result<bool, QueueError> {
        let mut records = self.records.lock().await;
        if !records.iter().any(|r| r.fingerprint() == fingerprint) {
            return Ok(false);
        }
        let next: Vec<QueueRecord> = records
            .iter()
            .filter(|r| r.fingerprint() != fingerprint)
            .cloned()
            .collect();
        self.persist(&next).await?;
        *records = next;
        Ok(true)
    }

    pub async fn contains(&self, fingerprint: &str) -> bool {
        self.records
            .lock()
            .await
            .iter()
            .any(|r| r.fingerprint() == fingerprint)
    }

    pub async fn records(&self) -> Vec<QueueRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Records queued longer than the retention horizon.
    pub async fn stale(&self) -> Vec<QueueRecord> {
        let now = Utc::now();
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.is_stale(self.retention, now))
            .cloned()
            .collect()
    }

    /// Replay every queued record through `deliver`.
    ///
    /// A record is removed only after `deliver` reports it accepted. Records
    /// appended while the drain runs are left for the next pass.
    pub async fn drain<F, Fut>(&self, mut deliver: F) -> Result<DrainReport, QueueError>
    where
        F: FnMut(DispatchItem) -> Fut,
        Fut: Future<Output = Delivery>,
    {
        let pending: Vec<DispatchItem> = self
            .records
            .lock()
            .await
            .iter()
            .map(|r| r.item.clone())
            .collect();

        let mut report = DrainReport::default();
        for item in pending {
            let fingerprint = item.fingerprint.clone();
            let outcome = deliver(item).await;

            let mut records = self.records.lock().await;
            let Some(index) = records.iter().position(|r| r.fingerprint() == fingerprint) else {
                continue;
            };

            match outcome {
                Delivery::Accepted { backend } => {
                    let mut next = records.clone();
                    let record = next.remove(index);
                    self.persist(&next).await?;
                    *records = next;
                    metrics::QUEUE_REDELIVERED.inc();
                    info!(
                        fingerprint = %fingerprint,
                        backend = %backend,
                        queued_secs = (Utc::now() - record.queued_at).num_seconds(),
                        "Queued item delivered"
                    );
                    report.delivered.push(fingerprint);
                }
                Delivery::Retained { reason, error } => {
                    let mut next = records.clone();
                    let record = &mut next[index];
                    record.reason = reason;
                    // Only a rejection means an add call reached a backend.
                    if reason == QueueReason::AllBackendsRejected {
                        record.item.attempts += 1;
                    }
                    if error.is_some() {
                        record.last_error = error;
                    }
                    self.persist(&next).await?;
                    *records = next;
                    report.retained += 1;
                }
                Delivery::Skipped => report.skipped += 1,
            }
        }

        let stale = self.stale().await;
        for record in &stale {
            warn!(
                fingerprint = %record.fingerprint(),
                reason = %record.reason,
                queued_at = %record.queued_at,
                attempts = record.item.attempts,
                "Queued item is past the retention horizon and needs operator attention"
            );
        }
        report.stale = stale.len();
        Ok(report)
    }

    async fn persist(&self, records: &[QueueRecord]) -> Result<(), QueueError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let tmp = tmp_path(&self.path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        metrics::QUEUE_DEPTH.set(records.len() as i64);
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn load(path: &Path) -> Result<Vec<QueueRecord>, QueueError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| QueueError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn upsert(records: &mut Vec<QueueRecord>, record: QueueRecord) {
    match records
        .iter_mut()
        .find(|r| r.fingerprint() == record.fingerprint())
    {
        Some(existing) => {
            existing.reason = record.reason;
            existing.item.attempts = existing.item.attempts.max(record.item.attempts);
            if record.last_error.is_some() {
                existing.last_error = record.last_error;
            }
        }
        None => records.push(record),
    }
}
