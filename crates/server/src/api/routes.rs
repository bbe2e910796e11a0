use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{
    audit, dispatch, events, governor, handlers, middleware::metrics_middleware, queue, status,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Status
        .route("/status", get(status::get_status))
        .route("/backends/health", get(status::backends_health))
        // Governor
        .route("/governor", get(governor::get_governor))
        .route("/governor/history", get(governor::get_history))
        .route("/governor/recheck", post(governor::recheck))
        // Offline queue
        .route("/queue", get(queue::list_queue))
        .route("/queue/drain", post(queue::drain_queue))
        // Dispatch (upstream feed entry point)
        .route("/dispatch", post(dispatch::dispatch))
        // Completion events
        .route("/events", get(events::list_events))
        // Audit
        .route("/audit", get(audit::query_audit));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
