//! Completion detection by diffing consecutive snapshots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use super::{
    CompletionEvent, CompletionKind, MonitorConfig, Snapshot, StateError, TorrentStateManager,
    TransferLifecycle,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct DiffState {
    /// Sequence of the snapshot last diffed; `None` until the baseline.
    last_seq: Option<u64>,
    previous: HashMap<String, (String, TransferLifecycle)>,
    /// Transfers already reported as completed. Cleared when a transfer
    /// becomes unfinished again so a later completion is reported anew.
    reported: HashSet<String>,
    /// Transfers that have left the listing at least once. They never raise
    /// `Completed` or `Vanished` again, even if they reappear.
    vanished: HashSet<String>,
    recent: VecDeque<CompletionEvent>,
}

/// Emits one event per transition into a finished payload, and one
/// `Vanished` event when a transfer leaves the listing. A transfer that has
/// vanished is done with: it raises nothing further if it comes back.
///
/// The first snapshot seen is a baseline: transfers already finished there
/// are treated as reported and raise nothing.
pub struct CompletionEventManager {
    state: Arc<TorrentStateManager>,
    diff: Mutex<DiffState>,
    recent_limit: usize,
    sender: broadcast::Sender<CompletionEvent>,
    audit: Option<AuditHandle>,
}

impl CompletionEventManager {
    pub fn new(state: Arc<TorrentStateManager>, config: &MonitorConfig) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state,
            diff: Mutex::new(DiffState::default()),
            recent_limit: config.recent_events_limit.max(1),
            sender,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Receive every event raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.sender.subscribe()
    }

    /// Events raised most recently, oldest first.
    pub async fn recent(&self) -> Vec<CompletionEvent> {
        self.diff.lock().await.recent.iter().cloned().collect()
    }

    /// Diff the latest snapshot against the previous one.
    ///
    /// A snapshot that has already been diffed yields nothing.
    pub async fn poll(&self) -> Result<Vec<CompletionEvent>, StateError> {
        let snapshot = self.state.latest_or_poll().await?;
        let events = {
            let mut diff = self.diff.lock().await;
            let events = diff_snapshot(&mut diff, &snapshot);
            for event in &events {
                if diff.recent.len() == self.recent_limit {
                    diff.recent.pop_front();
                }
                diff.recent.push_back(event.clone());
            }
            events
        };

        for event in &events {
            self.publish(event).await;
        }
        Ok(events)
    }

    async fn publish(&self, event: &CompletionEvent) {
        metrics::COMPLETION_EVENTS
            .with_label_values(&[event.kind.as_str()])
            .inc();

        match event.kind {
            CompletionKind::Completed => info!(
                transfer_id = %event.transfer_id,
                name = %event.name,
                prior_state = ?event.prior_state,
                "Transfer completed"
            ),
            CompletionKind::Vanished => warn!(
                transfer_id = %event.transfer_id,
                name = %event.name,
                prior_state = ?event.prior_state,
                "Transfer vanished from backend"
            ),
        }

        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());

        if let Some(ref audit) = self.audit {
            let transfer_id = event.transfer_id.clone();
            let name = event.name.clone();
            let prior_state = event.prior_state.map(|s| s.as_str().to_string());
            let audit_event = match event.kind {
                CompletionKind::Completed => AuditEvent::TransferCompleted {
                    transfer_id,
                    name,
                    prior_state,
                },
                CompletionKind::Vanished => AuditEvent::TransferVanished {
                    transfer_id,
                    name,
                    prior_state,
                },
            };
            audit.emit(audit_event).await;
        }
    }
}

fn diff_snapshot(diff: &mut DiffState, snapshot: &Snapshot) -> Vec<CompletionEvent> {
    if diff.last_seq == Some(snapshot.seq) {
        return Vec::new();
    }
    let baseline = diff.last_seq.is_none();
    diff.last_seq = Some(snapshot.seq);

    let now = Utc::now();
    let mut events = Vec::new();
    let mut current = HashMap::with_capacity(snapshot.transfers.len());

    for transfer in &snapshot.transfers {
        current.insert(
            transfer.id.clone(),
            (transfer.name.clone(), transfer.lifecycle),
        );

        if diff.vanished.contains(&transfer.id) {
            continue;
        }
        if !transfer.is_finished() {
            diff.reported.remove(&transfer.id);
            continue;
        }
        if !diff.reported.insert(transfer.id.clone()) || baseline {
            continue;
        }
        events.push(CompletionEvent {
            transfer_id: transfer.id.clone(),
            name: transfer.name.clone(),
            kind: CompletionKind::Completed,
            detected_at: now,
            prior_state: diff.previous.get(&transfer.id).map(|(_, state)| *state),
            new_state: Some(transfer.lifecycle),
        });
    }

    let mut vanished: Vec<_> = diff
        .previous
        .iter()
        .filter(|(id, _)| !current.contains_key(*id) && !diff.vanished.contains(*id))
        .map(|(id, (name, state))| (id.clone(), name.clone(), *state))
        .collect();
    vanished.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, name, state) in vanished {
        diff.vanished.insert(id.clone());
        events.push(CompletionEvent {
            transfer_id: id,
            name,
            kind: CompletionKind::Vanished,
            detected_at: now,
            prior_state: Some(state),
            new_state: None,
        });
    }

    diff.previous = current;
    events
}
