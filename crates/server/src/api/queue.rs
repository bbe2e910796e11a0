//! Offline queue handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use seedwarden_core::{DrainReport, QueueRecord};
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub records: Vec<QueueRecord>,
    pub total: usize,
    /// Records older than the retention horizon.
    pub stale: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueErrorResponse {
    pub error: String,
}

/// GET /api/v1/queue
pub async fn list_queue(State(state): State<Arc<AppState>>) -> Json<QueueResponse> {
    let queue = state.router().queue();
    let records = queue.records().await;
    Json(QueueResponse {
        total: records.len(),
        stale: queue.stale().await.len(),
        records,
    })
}

/// POST /api/v1/queue/drain
pub async fn drain_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DrainReport>, (StatusCode, Json<QueueErrorResponse>)> {
    state.router().drain_queue().await.map(Json).map_err(|e| {
        error!(error = %e, "Queue drain failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(QueueErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}
