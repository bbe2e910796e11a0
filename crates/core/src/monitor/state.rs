//! Transfer state polling and stall classification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::{MonitorConfig, Snapshot, StateError, TransferLifecycle, TransferState};
use crate::metrics;
use crate::torrent_client::{TorrentClient, TorrentFilters, TorrentInfo, TorrentState};

/// Polls after which an absent transfer's progress entry is dropped.
const PRUNE_AFTER_MISSED_POLLS: u32 = 2;

#[derive(Debug, Clone)]
struct ProgressEntry {
    last_bytes: u64,
    flat_polls: u32,
    last_progress_at: DateTime<Utc>,
    missed_polls: u32,
}

#[derive(Debug, Default)]
struct Tracker {
    seq: u64,
    progress: HashMap<String, ProgressEntry>,
}

/// Polls one backend and classifies each transfer.
///
/// A transfer is stalled only after `stall_polls` consecutive polls with no
/// progress while it is actively downloading. Progress entries survive one
/// missing listing and are pruned after two.
pub struct TorrentStateManager {
    client: Arc<dyn TorrentClient>,
    filters: TorrentFilters,
    stall_polls: u32,
    call_timeout: Duration,
    tracker: Mutex<Tracker>,
    latest: RwLock<Option<Arc<Snapshot>>>,
}

impl TorrentStateManager {
    pub fn new(client: Arc<dyn TorrentClient>, config: &MonitorConfig) -> Self {
        Self {
            client,
            filters: TorrentFilters {
                category: config.category.clone(),
            },
            stall_polls: config.stall_polls(),
            call_timeout: config.call_timeout(),
            tracker: Mutex::new(Tracker::default()),
            latest: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &str {
        self.client.name()
    }

    pub fn client(&self) -> &Arc<dyn TorrentClient> {
        &self.client
    }

    /// Poll the backend and return the classified transfers.
    pub async fn list(&self) -> Result<Vec<TransferState>, StateError> {
        Ok(self.poll().await?.transfers.clone())
    }

    /// Poll the backend and publish a new snapshot.
    pub async fn poll(&self) -> Result<Arc<Snapshot>, StateError> {
        let mut tracker = self.tracker.lock().await;

        let listing = tokio::time::timeout(self.call_timeout, self.client.list_torrents(&self.filters))
            .await
            .map_err(|_| StateError::Timeout)??;

        let now = Utc::now();
        for entry in tracker.progress.values_mut() {
            entry.missed_polls += 1;
        }

        let mut transfers = Vec::with_capacity(listing.len());
        for info in listing {
            let entry = tracker
                .progress
                .entry(info.hash.clone())
                .and_modify(|e| {
                    e.missed_polls = 0;
                    if info.completed_bytes > e.last_bytes {
                        e.flat_polls = 0;
                        e.last_progress_at = now;
                    } else if is_actively_downloading(&info) {
                        e.flat_polls += 1;
                    } else {
                        e.flat_polls = 0;
                    }
                    e.last_bytes = info.completed_bytes;
                })
                .or_insert_with(|| ProgressEntry {
                    last_bytes: info.completed_bytes,
                    flat_polls: 0,
                    last_progress_at: info.added_at.unwrap_or(now),
                    missed_polls: 0,
                });
            let entry = entry.clone();

            let lifecycle = classify(&info, entry.flat_polls, self.stall_polls);
            if lifecycle == TransferLifecycle::Stalled && entry.flat_polls == self.stall_polls {
                info!(
                    transfer_id = %info.hash,
                    name = %info.name,
                    flat_polls = entry.flat_polls,
                    last_progress_at = %entry.last_progress_at,
                    "Transfer stalled"
                );
            }

            transfers.push(TransferState {
                id: info.hash,
                name: info.name,
                lifecycle,
                progress_bytes: info.completed_bytes,
                size_bytes: info.size_bytes,
                uploaded_bytes: info.uploaded_bytes,
                downloaded_bytes: info.downloaded_bytes,
                last_progress_at: entry.last_progress_at,
                flat_polls: entry.flat_polls,
                category: info.category,
            });
        }

        let before = tracker.progress.len();
        tracker
            .progress
            .retain(|_, e| e.missed_polls < PRUNE_AFTER_MISSED_POLLS);
        let pruned = before - tracker.progress.len();
        if pruned > 0 {
            debug!(pruned, "Dropped progress entries for absent transfers");
        }

        tracker.seq += 1;
        let snapshot = Arc::new(Snapshot {
            seq: tracker.seq,
            taken_at: now,
            transfers,
        });

        metrics::TRANSFERS_STALLED.set(snapshot.count(TransferLifecycle::Stalled) as i64);
        *self.latest.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Most recent snapshot, if any poll has succeeded.
    pub async fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().await.clone()
    }

    /// Latest snapshot, polling once if there is none yet.
    pub async fn latest_or_poll(&self) -> Result<Arc<Snapshot>, StateError> {
        match self.latest().await {
            Some(snapshot) => Ok(snapshot),
            None => self.poll().await,
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.tracker.lock().await.progress.len()
    }
}

fn is_finished(info: &TorrentInfo) -> bool {
    info.progress >= 1.0 || (info.size_bytes > 0 && info.completed_bytes >= info.size_bytes)
}

fn is_actively_downloading(info: &TorrentInfo) -> bool {
    !is_finished(info) && matches!(info.state, TorrentState::Downloading | TorrentState::Stalled)
}

fn classify(info: &TorrentInfo, flat_polls: u32, stall_polls: u32) -> TransferLifecycle {
    if is_finished(info) {
        return match info.state {
            TorrentState::Seeding => TransferLifecycle::Seeding,
            TorrentState::Paused => TransferLifecycle::Paused,
            TorrentState::Error => TransferLifecycle::Errored,
            TorrentState::Checking => TransferLifecycle::Checking,
            _ => TransferLifecycle::Completed,
        };
    }
    match info.state {
        TorrentState::Downloading | TorrentState::Stalled if flat_polls >= stall_polls => {
            TransferLifecycle::Stalled
        }
        TorrentState::Downloading | TorrentState::Stalled => TransferLifecycle::Downloading,
        TorrentState::Seeding => TransferLifecycle::Seeding,
        TorrentState::Paused => TransferLifecycle::Paused,
        TorrentState::Error => TransferLifecycle::Errored,
        TorrentState::Checking => TransferLifecycle::Checking,
        TorrentState::Queued | TorrentState::Unknown => TransferLifecycle::Queued,
    }
}
