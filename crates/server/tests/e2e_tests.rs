//! End-to-end tests with mocked backends.
//!
//! These tests run the full server stack in-process with mock qBittorrent
//! backends, driving monitor cycles explicitly.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use seedwarden_core::{fingerprint_for, TorrentClientError, TorrentState};

use common::{fixtures, TestFixture};

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_passwords() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    let backends = response.body["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 2);
    assert_eq!(backends[0]["name"], "seedbox");
    assert_eq!(backends[0]["password_configured"], true);
    assert_eq!(backends[1]["password_configured"], false);
    assert!(!response.body.to_string().contains("secret"));
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/torrents").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_adds_to_primary() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({
                "items": [
                    { "payload": fixtures::magnet("aa01") },
                    { "payload": fixtures::magnet("aa02"), "category": "audiobooks" }
                ]
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    let added = response.body["added"].as_array().unwrap();
    assert_eq!(added.len(), 2);
    assert!(added.iter().all(|a| a["backend"] == "seedbox"));
    assert_eq!(
        added[0]["fingerprint"],
        fingerprint_for(&fixtures::magnet("aa01"))
    );
    assert!(response.body["queued"].as_array().unwrap().is_empty());
    assert_eq!(fixture.seedbox.added().len(), 2);
    assert!(fixture.home.added().is_empty());
}

#[tokio::test]
async fn test_dispatch_falls_back_to_secondary() {
    let fixture = TestFixture::new().await;
    fixture
        .seedbox
        .set_login_error(Some(TorrentClientError::ConnectionFailed(
            "connection refused".into(),
        )));

    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({ "items": [{ "payload": fixtures::magnet("bb01") }] }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["added"][0]["backend"], "home");
    assert_eq!(fixture.home.added_uris(), vec![fixtures::magnet("bb01")]);
}

#[tokio::test]
async fn test_dispatch_uses_supplied_fingerprint() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({
                "items": [{ "fingerprint": "feed-item-17", "payload": fixtures::magnet("bb02") }]
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["added"][0]["fingerprint"], "feed-item-17");
}

#[tokio::test]
async fn test_dispatch_rejects_empty_items() {
    let fixture = TestFixture::new().await;
    let response = fixture.post("/api/v1/dispatch", json!({ "items": [] })).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_dispatch_rejects_blank_payload() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({ "items": [{ "payload": fixtures::magnet("cc01") }, { "payload": "  " }] }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "items[1].payload is empty");
    assert!(fixture.seedbox.added().is_empty());
}

#[tokio::test]
async fn test_dispatch_malformed_json() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/dispatch", "{not json").await;
    assert!(response.status.is_client_error());
}

// =============================================================================
// Offline queue
// =============================================================================

#[tokio::test]
async fn test_outage_queues_then_drain_delivers() {
    let fixture = TestFixture::new().await;
    let down = TorrentClientError::ConnectionFailed("no route to host".into());
    fixture.seedbox.set_login_error(Some(down.clone()));
    fixture.home.set_login_error(Some(down));

    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({ "items": [{ "payload": fixtures::magnet("dd01") }] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(
        response.body["queued"][0]["reason"],
        "ALL_BACKENDS_UNAVAILABLE"
    );

    let queue = fixture.get("/api/v1/queue").await;
    assert_status!(queue, StatusCode::OK);
    assert_eq!(queue.body["total"], 1);
    assert_eq!(
        queue.body["records"][0]["item"]["payload"],
        fixtures::magnet("dd01")
    );

    // Backends recover; cached probe results are refreshed first.
    fixture.seedbox.set_login_error(None);
    fixture.home.set_login_error(None);
    let health = fixture.get("/api/v1/backends/health").await;
    assert_status!(health, StatusCode::OK);
    assert!(health.body["backends"]
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["status"] == "OK"));

    let drained = fixture.post_empty("/api/v1/queue/drain").await;
    assert_status!(drained, StatusCode::OK);
    assert_eq!(drained.body["delivered"].as_array().unwrap().len(), 1);

    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["total"], 0);
    assert_eq!(fixture.seedbox.added_uris(), vec![fixtures::magnet("dd01")]);
}

// =============================================================================
// Status and governor
// =============================================================================

#[tokio::test]
async fn test_status_reports_backends_and_queue() {
    let fixture = TestFixture::new().await;
    fixture
        .seedbox
        .insert_torrent(fixtures::seeding("ee00", 4_000, 1_000));
    fixture.cycle().await;

    let response = fixture.get("/api/v1/status").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["monitored_backend"], "seedbox");
    assert_eq!(response.body["backends"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["backends"][1]["role"], "secondary");
    assert_eq!(response.body["governor"]["mode"], "normal");
    assert_eq!(response.body["governor"]["ratio"], 4.0);
    assert_eq!(response.body["queue"]["depth"], 0);
    assert_eq!(response.body["supervisor"]["running"], false);
}

#[tokio::test]
async fn test_governor_recheck_enters_emergency_and_gates_dispatch() {
    let fixture = TestFixture::new().await;
    fixture
        .seedbox
        .insert_torrent(fixtures::seeding("ff00", 500, 1_000));

    let response = fixture.post_empty("/api/v1/governor/recheck").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["mode"], "emergency");
    assert_eq!(response.body["ratio"], 0.5);

    let governor = fixture.get("/api/v1/governor").await;
    assert_eq!(governor.body["mode"], "emergency");
    assert_eq!(governor.body["thresholds"]["critical_threshold"], 1.0);

    let history = fixture.get("/api/v1/governor/history").await;
    assert_eq!(history.body["transitions"].as_array().unwrap().len(), 1);
    assert_eq!(history.body["transitions"][0]["to"], "emergency");

    let response = fixture
        .post(
            "/api/v1/dispatch",
            json!({
                "items": [
                    { "payload": fixtures::magnet("ff01") },
                    { "payload": fixtures::magnet("ff02"), "priority": "essential" }
                ]
            }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["added"].as_array().unwrap().len(), 1);
    assert_eq!(response.body["queued"][0]["reason"], "RATIO_EMERGENCY");
    assert_eq!(fixture.seedbox.added_uris(), vec![fixtures::magnet("ff02")]);
}

#[tokio::test]
async fn test_governor_recheck_without_transfers_holds_normal() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_empty("/api/v1/governor/recheck").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["mode"], "normal");
    assert!(response.body["error"].is_string());
}

// =============================================================================
// Completion events
// =============================================================================

#[tokio::test]
async fn test_completion_events_listed() {
    let fixture = TestFixture::new().await;
    fixture
        .seedbox
        .insert_torrent(fixtures::torrent("gg01", TorrentState::Downloading, 0));
    fixture.cycle().await;

    fixture.seedbox.set_completed_bytes("gg01", fixtures::SIZE);
    let report = fixture.cycle().await;
    assert_eq!(report.completions, 1);

    let response = fixture.get("/api/v1/events").await;
    assert_status!(response, StatusCode::OK);
    let events = response.body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["transfer_id"], "gg01");
    assert_eq!(events[0]["kind"], "completed");
}

// =============================================================================
// Audit and metrics
// =============================================================================

#[tokio::test]
async fn test_audit_records_dispatch() {
    let fixture = TestFixture::new().await;
    let payload = fixtures::magnet("hh01");
    fixture
        .post("/api/v1/dispatch", json!({ "items": [{ "payload": payload }] }))
        .await;

    let response = fixture
        .wait_for_audit("/api/v1/audit?event_type=item_dispatched", 1)
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    let event = &response.body["events"][0];
    assert_eq!(event["subject"], fingerprint_for(&payload));
    assert_eq!(event["backend"], "seedbox");

    let filtered = fixture.get("/api/v1/audit?backend=home").await;
    assert_eq!(filtered.body["total"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("seedwarden_http_requests_total"));
    assert!(body.contains("seedwarden_supervisor_running"));
    assert!(body.contains("seedwarden_queue_stale"));
}
