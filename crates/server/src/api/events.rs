//! Completion event handler.

use axum::{extract::State, Json};
use serde::Serialize;
use seedwarden_core::CompletionEvent;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// Oldest first, bounded by `monitor.recent_events_limit`.
    pub events: Vec<CompletionEvent>,
}

/// GET /api/v1/events
pub async fn list_events(State(state): State<Arc<AppState>>) -> Json<EventsResponse> {
    Json(EventsResponse {
        events: state.completion().recent().await,
    })
}
