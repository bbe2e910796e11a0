//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatch (adds per backend, queueing, fallbacks, health probes)
//! - Offline queue (depth, redeliveries)
//! - Transfer supervision (stalls, restarts, completion events)
//! - Ratio governance (mode, ratio, transitions)
//! - Remote backend calls

use once_cell::sync::Lazy;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
};

// =============================================================================
// Dispatch
// =============================================================================

/// Items accepted by a backend.
pub static ITEMS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_items_dispatched_total",
            "Items accepted by a backend",
        ),
        &["backend"],
    )
    .unwrap()
});

/// Items parked in the offline queue, by reason code.
pub static ITEMS_QUEUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_items_queued_total",
            "Items written to the offline queue",
        ),
        &["reason"], // "ALL_BACKENDS_UNAVAILABLE", "RATIO_EMERGENCY", ...
    )
    .unwrap()
});

/// Items skipped because they were already delivered.
pub static ITEMS_DEDUPLICATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seedwarden_items_deduplicated_total",
        "Items recognised as already delivered",
    )
    .unwrap()
});

/// Backends abandoned mid-dispatch, by failure kind.
pub static BACKEND_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_backend_fallbacks_total",
            "Dispatch moved past a backend after a backend-wide failure",
        ),
        &["backend", "failure"],
    )
    .unwrap()
});

/// Fresh health probe outcomes.
pub static PROBE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seedwarden_probe_results_total", "Backend health probes"),
        &["backend", "status"],
    )
    .unwrap()
});

// =============================================================================
// Offline queue
// =============================================================================

/// Records currently in the offline queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("seedwarden_queue_depth", "Records in the offline queue").unwrap()
});

/// Queued items delivered by a drain.
pub static QUEUE_REDELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seedwarden_queue_redelivered_total",
        "Queued items delivered by a drain",
    )
    .unwrap()
});

// =============================================================================
// Transfer supervision
// =============================================================================

/// Transfers currently classified as stalled.
pub static TRANSFERS_STALLED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedwarden_transfers_stalled",
        "Transfers currently classified as stalled",
    )
    .unwrap()
});

/// Restart attempts on stalled transfers.
pub static TRANSFER_RESTARTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_transfer_restarts_total",
            "Restart attempts on stalled transfers",
        ),
        &["result"], // "restarted", "failed", "cooldown"
    )
    .unwrap()
});

/// Completion events emitted.
pub static COMPLETION_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_completion_events_total",
            "Completion events emitted",
        ),
        &["kind"], // "completed", "vanished"
    )
    .unwrap()
});

/// Monitor cycle duration.
pub static MONITOR_CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seedwarden_monitor_cycle_duration_seconds",
            "Duration of a supervision cycle",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["result"], // "ok", "error", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Ratio governance
// =============================================================================

/// Governor mode transitions, by target mode.
pub static GOVERNOR_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedwarden_governor_transitions_total",
            "Ratio governor mode transitions",
        ),
        &["to"],
    )
    .unwrap()
});

/// Current governor mode (0 normal, 1 warning, 2 emergency).
pub static GOVERNOR_MODE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedwarden_governor_mode",
        "Current ratio mode (0 normal, 1 warning, 2 emergency)",
    )
    .unwrap()
});

/// Last computed aggregate ratio.
pub static GOVERNOR_RATIO: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("seedwarden_governor_ratio", "Last computed upload/download ratio").unwrap()
});

/// Evaluations that could not compute a ratio.
pub static GOVERNOR_EVALUATION_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seedwarden_governor_evaluation_errors_total",
        "Governor evaluations that held the previous mode",
    )
    .unwrap()
});

// =============================================================================
// Remote backend calls
// =============================================================================

/// Backend call duration in seconds.
pub static BACKEND_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seedwarden_backend_call_duration_seconds",
            "Duration of calls to torrent backends",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["backend", "operation"],
    )
    .unwrap()
});

/// Backend calls by outcome (`ok` or a failure kind).
pub static BACKEND_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seedwarden_backend_calls_total", "Calls to torrent backends"),
        &["backend", "operation", "outcome"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatch
        Box::new(ITEMS_DISPATCHED.clone()),
        Box::new(ITEMS_QUEUED.clone()),
        Box::new(ITEMS_DEDUPLICATED.clone()),
        Box::new(BACKEND_FALLBACKS.clone()),
        Box::new(PROBE_RESULTS.clone()),
        // Queue
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(QUEUE_REDELIVERED.clone()),
        // Supervision
        Box::new(TRANSFERS_STALLED.clone()),
        Box::new(TRANSFER_RESTARTS.clone()),
        Box::new(COMPLETION_EVENTS.clone()),
        Box::new(MONITOR_CYCLE_DURATION.clone()),
        // Governor
        Box::new(GOVERNOR_TRANSITIONS.clone()),
        Box::new(GOVERNOR_MODE.clone()),
        Box::new(GOVERNOR_RATIO.clone()),
        Box::new(GOVERNOR_EVALUATION_ERRORS.clone()),
        // Backends
        Box::new(BACKEND_CALL_DURATION.clone()),
        Box::new(BACKEND_CALLS.clone()),
    ]
}
