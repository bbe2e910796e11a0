//! Status query handlers.
//!
//! `GET /status` answers from cached state only (probe cache, governor,
//! queue, supervisor); `GET /backends/health` runs fresh probes.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use seedwarden_core::{BackendRole, HealthRecord, RatioMode, SupervisorStatus};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub role: BackendRole,
    pub priority: u32,
    pub requires_vpn: bool,
    /// Last probe result; absent until the backend has been probed once.
    pub health: Option<HealthRecord>,
}

#[derive(Debug, Serialize)]
pub struct GovernorSummary {
    pub mode: RatioMode,
    pub ratio: Option<f64>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct QueueSummary {
    pub depth: usize,
    pub stale: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub monitored_backend: String,
    pub backends: Vec<BackendStatus>,
    pub governor: GovernorSummary,
    pub queue: QueueSummary,
    pub supervisor: SupervisorStatus,
}

#[derive(Debug, Serialize)]
pub struct BackendHealth {
    pub name: String,
    #[serde(flatten)]
    pub record: HealthRecord,
}

#[derive(Debug, Serialize)]
pub struct BackendsHealthResponse {
    pub backends: Vec<BackendHealth>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let router = state.router();
    let mut known = router.probe().last_known().await;
    let backends = router
        .endpoints()
        .iter()
        .map(|e| BackendStatus {
            name: e.name.clone(),
            role: e.role,
            priority: e.priority,
            requires_vpn: e.requires_vpn,
            health: known.remove(&e.name),
        })
        .collect();

    let last = state.governor().last_evaluation();
    let governor = GovernorSummary {
        mode: state.governor().mode(),
        ratio: last.as_ref().and_then(|s| s.ratio),
        evaluated_at: last.map(|s| s.evaluated_at),
    };

    let queue = QueueSummary {
        depth: router.queue().len().await,
        stale: router.queue().stale().await.len(),
    };

    Json(StatusResponse {
        monitored_backend: state.monitor().backend().to_string(),
        backends,
        governor,
        queue,
        supervisor: state.supervisor().status(),
    })
}

/// GET /api/v1/backends/health
///
/// Probes every backend concurrently, bypassing the cache.
pub async fn backends_health(State(state): State<Arc<AppState>>) -> Json<BackendsHealthResponse> {
    let router = state.router();
    let backends = router
        .probe()
        .probe_all(router.endpoints())
        .await
        .into_iter()
        .map(|(name, record)| BackendHealth { name, record })
        .collect();
    Json(BackendsHealthResponse { backends })
}
