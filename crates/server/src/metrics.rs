//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the seedwarden server:
//! - HTTP request metrics (latency, counts)
//! - Supervisor and backend health status (collected dynamically)
//! - Every core metric (dispatch, queue, monitor, governor)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seedwarden_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seedwarden_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedwarden_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Status Metrics (collected dynamically)
// =============================================================================

/// Supervisor running state (1 = running, 0 = stopped).
pub static SUPERVISOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedwarden_supervisor_running",
        "Whether the supervisor loops are running (1) or stopped (0)",
    )
    .unwrap()
});

/// Last known backend health (1 = ok, 0 = unhealthy).
pub static BACKEND_HEALTHY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "seedwarden_backend_healthy",
            "Last known backend health (1 ok, 0 unhealthy)",
        ),
        &["backend"],
    )
    .unwrap()
});

/// Records in the offline queue past the retention horizon.
pub static QUEUE_STALE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedwarden_queue_stale",
        "Offline queue records older than the retention horizon",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Status
    registry
        .register(Box::new(SUPERVISOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(BACKEND_HEALTHY.clone()))
        .unwrap();
    registry.register(Box::new(QUEUE_STALE.clone())).unwrap();

    // Core metrics (dispatch, queue, monitor, governor)
    for metric in seedwarden_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the supervisor, the probe
/// cache and the queue as they are now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.supervisor().status();
    SUPERVISOR_RUNNING.set(if status.running { 1 } else { 0 });

    for (backend, record) in state.router().probe().last_known().await {
        BACKEND_HEALTHY
            .with_label_values(&[&backend])
            .set(if record.status.is_healthy() { 1 } else { 0 });
    }

    QUEUE_STALE.set(state.router().queue().stale().await.len() as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static HEX_ID: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"[0-9a-fA-F]{40,64}").unwrap());
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = HEX_ID.replace_all(path, "{hash}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_hash() {
        let path = "/api/v1/queue/a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        assert_eq!(normalize_path(path), "/api/v1/queue/{hash}");
    }

    #[test]
    fn test_normalize_path_fingerprint() {
        let path = format!("/api/v1/queue/{}", "ab".repeat(32));
        assert_eq!(normalize_path(&path), "/api/v1/queue/{hash}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/audit/12345"), "/api/v1/audit/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        SUPERVISOR_RUNNING.set(0);
        BACKEND_HEALTHY.with_label_values(&["seedbox"]).set(1);
        seedwarden_core::metrics::QUEUE_DEPTH.set(0);
        seedwarden_core::metrics::GOVERNOR_MODE.set(0);

        let output = encode_metrics();
        assert!(output.contains("# HELP"));
        assert!(output.contains("seedwarden_http_requests_total"));
        assert!(output.contains("seedwarden_supervisor_running"));
        assert!(output.contains("seedwarden_backend_healthy"));
        assert!(output.contains("seedwarden_queue_depth"));
        assert!(output.contains("seedwarden_governor_mode"));
    }
}
