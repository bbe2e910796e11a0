//! Dispatch integration tests.
//!
//! These tests drive the router, health probe and offline queue together
//! against mock backends: VPN-gated fallback, total outage with later
//! redelivery, and queue recovery after a restart.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use seedwarden_core::{
    testing::{fixtures, MockTorrentClient, MockVpnChecker},
    BackendEndpoint, BackendHealthProbe, BackendRole, DispatchConfig, DispatchItem,
    DispatchRouter, OfflineQueue, ProbeStatus, QueueReason, TorrentClientError,
};

/// Test helper wiring two mock backends behind a router.
struct TestHarness {
    primary: Arc<MockTorrentClient>,
    secondary: Arc<MockTorrentClient>,
    vpn: Arc<MockVpnChecker>,
    probe: Arc<BackendHealthProbe>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            primary: Arc::new(MockTorrentClient::named("seedbox")),
            secondary: Arc::new(MockTorrentClient::named("home")),
            vpn: Arc::new(MockVpnChecker::up()),
            probe: Arc::new(BackendHealthProbe::new(
                Duration::from_secs(30),
                Duration::from_secs(5),
            )),
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn endpoints(&self) -> Vec<BackendEndpoint> {
        vec![
            BackendEndpoint::with_client(self.primary.clone())
                .priority(1)
                .requiring_vpn(),
            BackendEndpoint::with_client(self.secondary.clone())
                .priority(2)
                .role(BackendRole::Secondary),
        ]
    }

    async fn queue(&self) -> Arc<OfflineQueue> {
        Arc::new(
            OfflineQueue::open(self.temp_dir.path().join("queue.json"), 72)
                .await
                .expect("Failed to open queue"),
        )
    }

    async fn router(&self) -> DispatchRouter {
        let config = DispatchConfig {
            timeout_backoff_ms: 10,
            ..Default::default()
        };
        DispatchRouter::new(self.endpoints(), self.probe.clone(), self.queue().await, &config)
            .with_vpn(self.vpn.clone())
    }
}

fn items(hashes: &[&str]) -> Vec<DispatchItem> {
    hashes
        .iter()
        .map(|h| DispatchItem::from_payload(fixtures::magnet(h)))
        .collect()
}

#[tokio::test]
async fn test_vpn_down_routes_everything_to_secondary() {
    let harness = TestHarness::new();
    harness.vpn.set_up(false);
    let router = harness.router().await;

    let outcome = router.dispatch(items(&["aa01", "aa02", "aa03"])).await.unwrap();

    assert_eq!(outcome.added.len(), 3);
    assert!(outcome.queued.is_empty());
    assert!(outcome.added.iter().all(|a| a.backend == "home"));
    assert!(harness.primary.added().is_empty());
    assert_eq!(harness.primary.login_count(), 0);
    assert_eq!(harness.secondary.added().len(), 3);
}

#[tokio::test]
async fn test_outage_then_probe_and_drain_delivers_all() {
    let harness = TestHarness::new();
    let down = TorrentClientError::ConnectionFailed("connection refused".into());
    harness.primary.set_login_error(Some(down.clone()));
    harness.secondary.set_login_error(Some(down));
    let router = harness.router().await;

    let outcome = router.dispatch(items(&["bb01", "bb02"])).await.unwrap();
    assert!(outcome.added.is_empty());
    assert_eq!(outcome.queued.len(), 2);
    assert!(outcome
        .queued
        .iter()
        .all(|q| q.reason == QueueReason::AllBackendsUnavailable));
    assert_eq!(router.queue().len().await, 2);

    // Backends recover.
    harness.primary.set_login_error(None);
    harness.secondary.set_login_error(None);
    for endpoint in router.endpoints() {
        let record = harness.probe.probe_fresh(endpoint).await;
        assert_eq!(record.status, ProbeStatus::Ok);
    }

    let report = router.drain_queue().await.unwrap();
    assert_eq!(report.delivered.len(), 2);
    assert!(router.queue().is_empty().await);
    assert_eq!(harness.primary.added().len(), 2);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let harness = TestHarness::new();
    let down = TorrentClientError::ConnectionFailed("no route to host".into());
    harness.primary.set_login_error(Some(down.clone()));
    harness.secondary.set_login_error(Some(down));

    {
        let router = harness.router().await;
        router.dispatch(items(&["cc01"])).await.unwrap();
    }

    // A fresh router over the same file sees the record.
    harness.primary.set_login_error(None);
    harness.secondary.set_login_error(None);
    let probe = Arc::new(BackendHealthProbe::new(
        Duration::from_secs(30),
        Duration::from_secs(5),
    ));
    let router = DispatchRouter::new(
        harness.endpoints(),
        probe,
        harness.queue().await,
        &DispatchConfig::default(),
    )
    .with_vpn(harness.vpn.clone());
    assert_eq!(router.queue().len().await, 1);

    let report = router.drain_queue().await.unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(harness.primary.added_uris(), vec![fixtures::magnet("cc01")]);
}

#[tokio::test]
async fn test_redispatch_after_acceptance_is_a_noop() {
    let harness = TestHarness::new();
    let router = harness.router().await;

    router.dispatch(items(&["dd01"])).await.unwrap();
    let outcome = router.dispatch(items(&["dd01"])).await.unwrap();

    assert_eq!(outcome.added.len(), 1);
    assert!(outcome.added[0].deduplicated);
    assert_eq!(harness.primary.add_attempts(), 1);
}
