//! Transfer control: stall recovery, pause and resume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{MonitorConfig, StateError, TorrentStateManager, TransferLifecycle};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::torrent_client::TorrentClientError;

/// A control call that failed for one transfer.
#[derive(Debug, Clone, Serialize)]
pub struct ControlFailure {
    pub transfer_id: String,
    pub error: String,
}

/// Result of a stalled-transfer restart pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestartReport {
    pub restarted: Vec<String>,
    pub failed: Vec<ControlFailure>,
    /// Stalled but restarted too recently.
    pub cooling_down: Vec<String>,
}

/// Result of resuming paused finished transfers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResumeReport {
    pub resumed: Vec<String>,
    pub failed: Vec<ControlFailure>,
}

/// Issues recheck/resume/pause calls against the supervised backend.
pub struct TorrentControlManager {
    state: Arc<TorrentStateManager>,
    cooldown: Duration,
    call_timeout: Duration,
    last_restart: Mutex<HashMap<String, Instant>>,
    cancel: CancellationToken,
    audit: Option<AuditHandle>,
}

impl TorrentControlManager {
    pub fn new(state: Arc<TorrentStateManager>, config: &MonitorConfig) -> Self {
        Self {
            state,
            cooldown: config.restart_cooldown(),
            call_timeout: config.call_timeout(),
            last_restart: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            audit: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Force-recheck and resume every stalled transfer in the latest
    /// snapshot, at most once per cooldown each. One failure never stops
    /// the rest.
    pub async fn restart_stalled(&self) -> Result<RestartReport, StateError> {
        let snapshot = self.state.latest_or_poll().await?;
        let mut report = RestartReport::default();

        for transfer in snapshot
            .transfers
            .iter()
            .filter(|t| t.lifecycle == TransferLifecycle::Stalled)
        {
            if self.cancel.is_cancelled() {
                info!("Restart pass cancelled");
                break;
            }

            {
                let mut last = self.last_restart.lock().await;
                if let Some(at) = last.get(&transfer.id) {
                    if at.elapsed() < self.cooldown {
                        metrics::TRANSFER_RESTARTS.with_label_values(&["cooldown"]).inc();
                        report.cooling_down.push(transfer.id.clone());
                        continue;
                    }
                }
                last.insert(transfer.id.clone(), Instant::now());
            }

            let result = self.restart(&transfer.id).await;
            match result {
                Ok(()) => {
                    metrics::TRANSFER_RESTARTS.with_label_values(&["restarted"]).inc();
                    info!(
                        transfer_id = %transfer.id,
                        name = %transfer.name,
                        last_progress_at = %transfer.last_progress_at,
                        "Restarted stalled transfer"
                    );
                    report.restarted.push(transfer.id.clone());
                }
                Err(ref e) => {
                    metrics::TRANSFER_RESTARTS.with_label_values(&["failed"]).inc();
                    warn!(transfer_id = %transfer.id, error = %e, "Failed to restart stalled transfer");
                    report.failed.push(ControlFailure {
                        transfer_id: transfer.id.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::TransferRestarted {
                        transfer_id: transfer.id.clone(),
                        name: transfer.name.clone(),
                        success: result.is_ok(),
                        error: result.err().map(|e| e.to_string()),
                    })
                    .await;
            }
        }

        Ok(report)
    }

    /// Resume finished transfers that are paused, so they seed again.
    pub async fn resume_seedable(&self) -> Result<ResumeReport, StateError> {
        let snapshot = self.state.latest_or_poll().await?;
        let mut report = ResumeReport::default();

        for transfer in snapshot
            .transfers
            .iter()
            .filter(|t| t.lifecycle == TransferLifecycle::Paused && t.is_finished())
        {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.resume(&transfer.id).await {
                Ok(()) => {
                    info!(transfer_id = %transfer.id, name = %transfer.name, "Resumed for seeding");
                    report.resumed.push(transfer.id.clone());
                }
                Err(e) => {
                    warn!(transfer_id = %transfer.id, error = %e, "Failed to resume transfer");
                    report.failed.push(ControlFailure {
                        transfer_id: transfer.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    pub async fn pause(&self, id: &str) -> Result<(), StateError> {
        self.call(self.state.client().pause_torrent(id)).await
    }

    pub async fn resume(&self, id: &str) -> Result<(), StateError> {
        self.call(self.state.client().resume_torrent(id)).await
    }

    async fn restart(&self, id: &str) -> Result<(), StateError> {
        self.call(self.state.client().recheck_torrent(id)).await?;
        self.resume(id).await
    }

    async fn call<F>(&self, fut: F) -> Result<(), StateError>
    where
        F: std::future::Future<Output = Result<(), TorrentClientError>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| StateError::Timeout)?
            .map_err(StateError::from)
    }
}
