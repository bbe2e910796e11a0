//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock backends injected, enabling E2E testing without a real
//! qBittorrent instance.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use seedwarden_core::{
    create_audit_system, load_config_from_str, testing::MockTorrentClient, AuditStore,
    BackendEndpoint, BackendRole, SqliteAuditStore,
};
use seedwarden_server::state::AppState;

/// Re-export fixtures for test convenience
pub use seedwarden_core::testing::fixtures;

/// Test fixture for E2E testing with mock backends.
///
/// Two backends are configured: `seedbox` (priority 1, supervised) and
/// `home` (priority 2, secondary). The supervisor loops are not started;
/// tests drive monitor cycles explicitly with [`TestFixture::cycle`].
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_dispatch() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/dispatch", json!({
///         "items": [{ "payload": fixtures::magnet("aa01") }]
///     })).await;
///
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Primary (supervised) backend
    pub seedbox: Arc<MockTorrentClient>,
    /// Secondary backend
    pub home: Arc<MockTorrentClient>,
    /// Temporary directory for the audit database and offline queue
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let queue_path = temp_dir.path().join("queue.json");

        let config = load_config_from_str(&format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = {:?}

[[backends]]
name = "seedbox"
url = "http://seedbox.invalid:8080"
username = "admin"
password = "secret"
priority = 1

[[backends]]
name = "home"
url = "http://home.invalid:8080"
username = "admin"
password = ""
role = "secondary"
priority = 2

[dispatch]
timeout_backoff_ms = 10

[queue]
path = {:?}

[monitor]
poll_interval_secs = 60
stall_window_secs = 120
"#,
            db_path.display().to_string(),
            queue_path.display().to_string(),
        ))
        .expect("Failed to parse test config");

        let seedbox = Arc::new(MockTorrentClient::named("seedbox"));
        let home = Arc::new(MockTorrentClient::named("home"));
        let endpoints = vec![
            BackendEndpoint::with_client(seedbox.clone()).priority(1),
            BackendEndpoint::with_client(home.clone())
                .priority(2)
                .role(BackendRole::Secondary),
        ];

        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let state = Arc::new(
            AppState::build(config, endpoints, None, audit_handle, audit_store)
                .await
                .expect("Failed to build app state"),
        );
        let router = seedwarden_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            seedbox,
            home,
            temp_dir,
        }
    }

    /// Run one monitor cycle (poll, restart, governor, completion).
    pub async fn cycle(&self) -> seedwarden_core::CycleReport {
        self.state
            .supervisor()
            .cycle()
            .run()
            .await
            .expect("monitor cycle failed")
    }

    /// Poll the audit endpoint until `path` returns at least `count` events.
    pub async fn wait_for_audit(&self, path: &str, count: usize) -> TestResponse {
        for _ in 0..50 {
            let response = self.get(path).await;
            let len = response.body["events"]
                .as_array()
                .map(|e| e.len())
                .unwrap_or(0);
            if len >= count {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("audit events for {} never reached {}", path, count);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        TestResponse {
            status,
            body: parse_json(&bytes),
        }
    }

    /// Send a GET request and return the body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let (status, bytes) = self.send(request).await;
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        let (status, bytes) = self.send(request).await;
        TestResponse {
            status,
            body: parse_json(&bytes),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, body_bytes.to_vec())
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
