//! Mock torrent client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::torrent_client::{
    extract_info_hash, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

const MOCK_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Default)]
struct MockState {
    torrents: HashMap<String, TorrentInfo>,
    added: Vec<AddTorrentRequest>,
    login_error: Option<TorrentClientError>,
    capability_error: Option<TorrentClientError>,
    add_error: Option<TorrentClientError>,
    /// One-shot add errors, consumed before `add_error`.
    queued_add_errors: VecDeque<TorrentClientError>,
    /// Item-level rejections keyed by URI.
    rejected_uris: HashMap<String, TorrentClientError>,
    list_error: Option<TorrentClientError>,
    control_error: Option<TorrentClientError>,
    call_delay: Option<Duration>,
    logins: usize,
    add_attempts: usize,
    rechecked: Vec<String>,
    resumed: Vec<String>,
    paused: Vec<String>,
    hash_counter: u32,
}

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Record added torrents for assertions
/// - Drive torrent progress and state between polls
/// - Simulate backend-wide and item-level failures, and slow responses
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::named("seedbox");
/// client.set_login_error(Some(TorrentClientError::ConnectionFailed("down".into())));
///
/// client.insert_torrent(fixtures::torrent("abc", TorrentState::Downloading, 0));
/// client.set_completed_bytes("abc", 1024);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    name: String,
    state: Mutex<MockState>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- failure injection ---------------------------------------------------

    /// Make every login fail (or succeed again with `None`).
    pub fn set_login_error(&self, error: Option<TorrentClientError>) {
        self.state().login_error = error;
    }

    /// Make the authenticated capability call fail.
    pub fn set_capability_error(&self, error: Option<TorrentClientError>) {
        self.state().capability_error = error;
    }

    /// Make every add fail.
    pub fn set_add_error(&self, error: Option<TorrentClientError>) {
        self.state().add_error = error;
    }

    /// Fail the next add only.
    pub fn push_add_error(&self, error: TorrentClientError) {
        self.state().queued_add_errors.push_back(error);
    }

    /// Reject adds of one specific URI.
    pub fn reject_uri(&self, uri: impl Into<String>, error: TorrentClientError) {
        self.state().rejected_uris.insert(uri.into(), error);
    }

    pub fn set_list_error(&self, error: Option<TorrentClientError>) {
        self.state().list_error = error;
    }

    /// Make pause/resume/recheck fail.
    pub fn set_control_error(&self, error: Option<TorrentClientError>) {
        self.state().control_error = error;
    }

    /// Delay login, capability, add and list calls.
    pub fn set_call_delay(&self, delay: Duration) {
        self.state().call_delay = Some(delay);
    }

    // -- torrent state -------------------------------------------------------

    pub fn insert_torrent(&self, info: TorrentInfo) {
        self.state().torrents.insert(info.hash.clone(), info);
    }

    pub fn remove_torrent(&self, hash: &str) {
        self.state().torrents.remove(hash);
    }

    /// Set verified bytes; progress follows, and reaching the full size
    /// moves a downloading torrent to seeding.
    pub fn set_completed_bytes(&self, hash: &str, completed: u64) {
        let mut state = self.state();
        if let Some(t) = state.torrents.get_mut(hash) {
            t.completed_bytes = completed.min(t.size_bytes);
            t.downloaded_bytes = t.downloaded_bytes.max(t.completed_bytes);
            t.progress = if t.size_bytes == 0 {
                1.0
            } else {
                t.completed_bytes as f64 / t.size_bytes as f64
            };
            if t.progress >= 1.0 && matches!(t.state, TorrentState::Downloading | TorrentState::Stalled) {
                t.state = TorrentState::Seeding;
            }
        }
    }

    pub fn set_state(&self, hash: &str, torrent_state: TorrentState) {
        if let Some(t) = self.state().torrents.get_mut(hash) {
            t.state = torrent_state;
        }
    }

    /// Set session transfer totals used for ratio computation.
    pub fn set_transfer(&self, hash: &str, uploaded: u64, downloaded: u64) {
        if let Some(t) = self.state().torrents.get_mut(hash) {
            t.uploaded_bytes = uploaded;
            t.downloaded_bytes = downloaded;
        }
    }

    // -- assertions ----------------------------------------------------------

    pub fn added(&self) -> Vec<AddTorrentRequest> {
        self.state().added.clone()
    }

    pub fn added_uris(&self) -> Vec<String> {
        self.state().added.iter().map(|r| r.uri.clone()).collect()
    }

    /// Add calls that reached the backend, including failed ones.
    pub fn add_attempts(&self) -> usize {
        self.state().add_attempts
    }

    pub fn login_count(&self) -> usize {
        self.state().logins
    }

    pub fn rechecked(&self) -> Vec<String> {
        self.state().rechecked.clone()
    }

    pub fn resumed(&self) -> Vec<String> {
        self.state().resumed.clone()
    }

    pub fn paused(&self) -> Vec<String> {
        self.state().paused.clone()
    }

    pub fn torrent(&self, hash: &str) -> Option<TorrentInfo> {
        self.state().torrents.get(hash).cloned()
    }

    async fn delay(&self) {
        let delay = self.state().call_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn control(&self, hash: &str, apply: impl FnOnce(&mut MockState)) -> Result<(), TorrentClientError> {
        let mut state = self.state();
        if let Some(ref e) = state.control_error {
            return Err(e.clone());
        }
        if !state.torrents.contains_key(hash) {
            return Err(TorrentClientError::ApiError(format!("unknown torrent {}", hash)));
        }
        apply(&mut state);
        Ok(())
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn login(&self) -> Result<(), TorrentClientError> {
        self.delay().await;
        let mut state = self.state();
        state.logins += 1;
        match state.login_error {
            Some(ref e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn api_version(&self) -> Result<String, TorrentClientError> {
        self.delay().await;
        match self.state().capability_error {
            Some(ref e) => Err(e.clone()),
            None => Ok("2.9.3".to_string()),
        }
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        self.delay().await;
        let mut state = self.state();
        state.add_attempts += 1;

        if let Some(e) = state.queued_add_errors.pop_front() {
            return Err(e);
        }
        if let Some(ref e) = state.add_error {
            return Err(e.clone());
        }
        if let Some(e) = state.rejected_uris.get(&request.uri) {
            return Err(e.clone());
        }

        let hash = match extract_info_hash(&request.uri) {
            Some(hash) => hash,
            None => {
                state.hash_counter += 1;
                format!("mockhash{:08x}", state.hash_counter)
            }
        };

        let info = TorrentInfo {
            hash: hash.clone(),
            name: format!("Mock Torrent {}", &hash[..hash.len().min(8)]),
            state: if request.paused {
                TorrentState::Paused
            } else {
                TorrentState::Downloading
            },
            progress: 0.0,
            size_bytes: MOCK_SIZE,
            completed_bytes: 0,
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            category: request.category.clone(),
            added_at: Some(Utc::now()),
        };
        state.torrents.insert(hash.clone(), info);
        state.added.push(request);

        Ok(AddTorrentResult { hash: Some(hash) })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.delay().await;
        let state = self.state();
        if let Some(ref e) = state.list_error {
            return Err(e.clone());
        }
        let mut result: Vec<TorrentInfo> = state
            .torrents
            .values()
            .filter(|t| match filters.category {
                Some(ref category) => t.category.as_ref() == Some(category),
                None => true,
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(result)
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.control(hash, |s| {
            s.paused.push(hash.to_string());
            if let Some(t) = s.torrents.get_mut(hash) {
                t.state = TorrentState::Paused;
            }
        })
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.control(hash, |s| {
            s.resumed.push(hash.to_string());
            if let Some(t) = s.torrents.get_mut(hash) {
                t.state = if t.progress >= 1.0 {
                    TorrentState::Seeding
                } else {
                    TorrentState::Downloading
                };
            }
        })
    }

    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.control(hash, |s| {
            s.rechecked.push(hash.to_string());
        })
    }
}
