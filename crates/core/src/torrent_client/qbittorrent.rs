//! qBittorrent torrent client implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BackendConfig;

use super::{
    extract_info_hash, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// Name of the session cookie issued by the WebUI.
const SESSION_COOKIE: &str = "SID";

/// An authenticated WebUI session.
#[derive(Debug, Clone)]
struct Session {
    /// `None` when the WebUI accepted the login without issuing a cookie
    /// (e.g. auth bypass for whitelisted subnets).
    sid: Option<String>,
    obtained_at: Instant,
}

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: BackendConfig,
    session_ttl: Duration,
    /// Session cookie (refreshed when missing, expired or rejected).
    session: RwLock<Option<Session>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: BackendConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| TorrentClientError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session_ttl: Duration::from_secs(config.session_ttl_secs),
            config,
            session: RwLock::new(None),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Return a usable session id, logging in if the cached one is missing or expired.
    async fn ensure_session(&self) -> Result<Option<String>, TorrentClientError> {
        {
            let session = self.session.read().await;
            if let Some(s) = session.as_ref() {
                if s.obtained_at.elapsed() < self.session_ttl {
                    return Ok(s.sid.clone());
                }
                debug!(backend = %self.config.name, "qBittorrent session expired locally");
            }
        }
        self.login().await?;
        Ok(self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.sid.clone()))
    }

    async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    fn with_session(builder: RequestBuilder, sid: Option<&str>) -> RequestBuilder {
        match sid {
            Some(sid) => builder.header(
                reqwest::header::COOKIE,
                format!("{}={}", SESSION_COOKIE, sid),
            ),
            None => builder,
        }
    }

    /// Send an authenticated request, re-authenticating once if the backend
    /// rejects the session with 401/403.
    async fn execute<F>(&self, build: F) -> Result<String, TorrentClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let sid = self.ensure_session().await?;
        let response = Self::with_session(build(&self.client), sid.as_deref())
            .send()
            .await
            .map_err(map_transport_error)?;

        if !is_session_rejected(response.status()) {
            return read_body(response).await;
        }

        warn!(
            backend = %self.config.name,
            status = %response.status(),
            "qBittorrent session rejected, re-authenticating"
        );
        self.invalidate_session().await;
        let sid = self.ensure_session().await?;
        let response = Self::with_session(build(&self.client), sid.as_deref())
            .send()
            .await
            .map_err(map_transport_error)?;

        if is_session_rejected(response.status()) {
            return Err(TorrentClientError::AuthenticationFailed(format!(
                "session rejected after re-login (HTTP {})",
                response.status()
            )));
        }
        read_body(response).await
    }
}

/// Whether the status code means the session is missing or no longer valid.
fn is_session_rejected(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn map_transport_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

async fn read_body(response: Response) -> Result<String, TorrentClientError> {
    let status = response.status();
    if matches!(
        status,
        StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS | StatusCode::INSUFFICIENT_STORAGE
    ) {
        return Err(TorrentClientError::CapacityExceeded(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
    }
    response.text().await.map_err(map_transport_error)
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    size: i64,
    #[serde(default)]
    completed: i64,
    downloaded: i64,
    uploaded: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    category: String,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            completed_bytes: self.completed.max(0) as u64,
            downloaded_bytes: self.downloaded.max(0) as u64,
            uploaded_bytes: self.uploaded.max(0) as u64,
            category: if self.category.is_empty() {
                None
            } else {
                Some(self.category)
            },
            added_at: timestamp_to_datetime(self.added_on),
        }
    }
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
            TorrentState::Downloading
        }
        "uploading" | "forcedUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        "queuedDL" | "queuedUP" => TorrentState::Queued,
        "stalledDL" | "stalledUP" => TorrentState::Stalled,
        "error" | "missingFiles" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            // The WebUI rejects logins whose Referer does not match its host.
            .header(reqwest::header::REFERER, self.base_url())
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let sid = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());
        let body = response.text().await.unwrap_or_default();

        if status.is_success() && body.trim() == "Ok." {
            debug!(backend = %self.config.name, "qBittorrent login successful");
            *self.session.write().await = Some(Session {
                sid,
                obtained_at: Instant::now(),
            });
            Ok(())
        } else if body.contains("Fails.") || is_session_rejected(status) {
            self.invalidate_session().await;
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            self.invalidate_session().await;
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected login response (HTTP {}): {}",
                status,
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn api_version(&self) -> Result<String, TorrentClientError> {
        let url = format!("{}/api/v2/app/webapiVersion", self.base_url());
        let body = self.execute(|client| client.get(&url)).await?;
        Ok(body.trim().to_string())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let url = format!("{}/api/v2/torrents/add", self.base_url());
        let save_path = request
            .download_path
            .clone()
            .or_else(|| self.config.download_path.clone());

        let body = self
            .execute(|client| {
                let mut form = multipart::Form::new().text("urls", request.uri.clone());
                if let Some(path) = &save_path {
                    form = form.text("savepath", path.clone());
                }
                if let Some(cat) = &request.category {
                    form = form.text("category", cat.clone());
                }
                if request.paused {
                    form = form.text("paused", "true");
                }
                client.post(&url).multipart(form)
            })
            .await?;

        if body.contains("Fails.") {
            return Err(TorrentClientError::ApiError(
                "backend refused the torrent".to_string(),
            ));
        }

        Ok(AddTorrentResult {
            hash: extract_info_hash(&request.uri),
        })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let mut url = format!("{}/api/v2/torrents/info", self.base_url());
        if let Some(category) = &filters.category {
            url.push_str(&format!("?category={}", urlencoding::encode(category)));
        }

        let response = self.execute(|client| client.get(&url)).await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response).map_err(|e| {
            TorrentClientError::ApiError(format!("Failed to parse response: {}", e))
        })?;

        Ok(torrents.into_iter().map(|t| t.into_torrent_info()).collect())
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/torrents/pause", self.base_url());
        let hash_lower = hash.to_lowercase();
        self.execute(|client| client.post(&url).form(&[("hashes", hash_lower.as_str())]))
            .await?;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/torrents/resume", self.base_url());
        let hash_lower = hash.to_lowercase();
        self.execute(|client| client.post(&url).form(&[("hashes", hash_lower.as_str())]))
            .await?;
        Ok(())
    }

    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/torrents/recheck", self.base_url());
        let hash_lower = hash.to_lowercase();
        self.execute(|client| client.post(&url).form(&[("hashes", hash_lower.as_str())]))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_qb_state_downloading() {
        assert_eq!(parse_qb_state("downloading"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("forcedDL"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("metaDL"), TorrentState::Downloading);
    }

    #[test]
    fn test_parse_qb_state_seeding_and_paused() {
        assert_eq!(parse_qb_state("uploading"), TorrentState::Seeding);
        assert_eq!(parse_qb_state("forcedUP"), TorrentState::Seeding);
        assert_eq!(parse_qb_state("pausedUP"), TorrentState::Paused);
        assert_eq!(parse_qb_state("stoppedDL"), TorrentState::Paused);
    }

    #[test]
    fn test_parse_qb_state_stalled_and_error() {
        assert_eq!(parse_qb_state("stalledDL"), TorrentState::Stalled);
        assert_eq!(parse_qb_state("stalledUP"), TorrentState::Stalled);
        assert_eq!(parse_qb_state("missingFiles"), TorrentState::Error);
        assert_eq!(parse_qb_state("something_else"), TorrentState::Unknown);
    }

    #[test]
    fn test_session_rejection_codes() {
        assert!(is_session_rejected(StatusCode::UNAUTHORIZED));
        assert!(is_session_rejected(StatusCode::FORBIDDEN));
        assert!(!is_session_rejected(StatusCode::OK));
        assert!(!is_session_rejected(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let dt = timestamp_to_datetime(1703980800).unwrap();
        assert_eq!(dt.year(), 2023);
        assert!(timestamp_to_datetime(-1).is_none());
        assert!(timestamp_to_datetime(0).is_none());
    }

    #[test]
    fn test_qb_torrent_info_deserialize_and_convert() {
        let json = r#"{
            "hash": "ABC123",
            "name": "Some Audiobook",
            "state": "stalledDL",
            "progress": 0.25,
            "size": 1000000,
            "completed": 250000,
            "downloaded": 260000,
            "uploaded": 50000,
            "added_on": 1703980800,
            "category": "audiobooks",
            "ratio": 0.19
        }"#;
        let qb: QBTorrentInfo = serde_json::from_str(json).unwrap();
        let info = qb.into_torrent_info();
        assert_eq!(info.hash, "abc123");
        assert_eq!(info.state, TorrentState::Stalled);
        assert_eq!(info.completed_bytes, 250000);
        assert_eq!(info.downloaded_bytes, 260000);
        assert_eq!(info.uploaded_bytes, 50000);
        assert_eq!(info.category, Some("audiobooks".to_string()));
    }

    #[tokio::test]
    async fn test_new_client_has_no_session() {
        let client = QBittorrentClient::new(BackendConfig::new(
            "primary",
            "http://127.0.0.1:1/",
        ))
        .unwrap();
        assert_eq!(client.name(), "primary");
        assert_eq!(client.base_url(), "http://127.0.0.1:1");
        assert!(client.session.read().await.is_none());
    }

    #[tokio::test]
    async fn test_login_against_closed_port_is_unreachable() {
        let client = QBittorrentClient::new(BackendConfig::new(
            "primary",
            "http://127.0.0.1:1",
        ))
        .unwrap();
        let err = client.login().await.unwrap_err();
        assert!(matches!(
            err,
            TorrentClientError::ConnectionFailed(_) | TorrentClientError::Timeout
        ));
    }
}
