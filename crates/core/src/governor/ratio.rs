//! Ratio governor state machine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{EmergencySnapshot, GovernorConfig, ModeTransition, RatioMode};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::monitor::{Snapshot, TorrentControlManager, TorrentStateManager, TransferLifecycle};

/// Mode after observing `ratio` while in `current`.
///
/// Leaving an emergency requires climbing above the warning threshold, so a
/// ratio between the two thresholds keeps an emergency in place.
pub fn next_mode(current: RatioMode, ratio: f64, config: &GovernorConfig) -> RatioMode {
    if ratio <= config.critical_threshold {
        RatioMode::Emergency
    } else if ratio <= config.warning_threshold {
        match current {
            RatioMode::Emergency => RatioMode::Emergency,
            _ => RatioMode::Warning,
        }
    } else {
        RatioMode::Normal
    }
}

/// Aggregate uploaded / downloaded bytes for a snapshot.
pub fn compute_ratio(snapshot: &Snapshot) -> Result<f64, String> {
    let (uploaded, downloaded) = snapshot.totals();
    if downloaded == 0 {
        return Err("no downloaded bytes to compute a ratio from".to_string());
    }
    Ok(uploaded as f64 / downloaded as f64)
}

#[derive(Debug, Default)]
struct GovernorState {
    entered_at: Option<DateTime<Utc>>,
    last: Option<EmergencySnapshot>,
    history: VecDeque<EmergencySnapshot>,
    transitions: VecDeque<ModeTransition>,
}

/// Owns the ratio mode and publishes it to the dispatch router.
///
/// Only one evaluation runs at a time. A caller that arrives while one is
/// in flight receives that evaluation's result instead of starting another.
/// When the ratio cannot be computed the previous mode is kept.
pub struct RatioGovernor {
    config: GovernorConfig,
    state: Arc<TorrentStateManager>,
    control: Arc<TorrentControlManager>,
    mode: watch::Sender<RatioMode>,
    evaluating: Mutex<()>,
    generation: AtomicU64,
    inner: StdMutex<GovernorState>,
    audit: Option<AuditHandle>,
}

impl RatioGovernor {
    pub fn new(
        config: GovernorConfig,
        state: Arc<TorrentStateManager>,
        control: Arc<TorrentControlManager>,
    ) -> Self {
        let (mode, _) = watch::channel(RatioMode::Normal);
        metrics::GOVERNOR_MODE.set(RatioMode::Normal.gauge_value());
        Self {
            config,
            state,
            control,
            mode,
            evaluating: Mutex::new(()),
            generation: AtomicU64::new(0),
            inner: StdMutex::new(GovernorState::default()),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn mode(&self) -> RatioMode {
        *self.mode.borrow()
    }

    /// Follow mode changes. The router uses this for admission.
    pub fn subscribe(&self) -> watch::Receiver<RatioMode> {
        self.mode.subscribe()
    }

    pub fn last_evaluation(&self) -> Option<EmergencySnapshot> {
        self.inner().last.clone()
    }

    /// Past evaluations, oldest first.
    pub fn history(&self) -> Vec<EmergencySnapshot> {
        self.inner().history.iter().cloned().collect()
    }

    /// Recorded mode transitions, oldest first.
    pub fn transitions(&self) -> Vec<ModeTransition> {
        self.inner().transitions.iter().cloned().collect()
    }

    /// Evaluate the ratio from the latest transfer snapshot.
    pub async fn evaluate(&self) -> EmergencySnapshot {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.evaluating.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(last) = self.last_evaluation() {
                return last;
            }
        }

        let snapshot = self.run_evaluation().await;
        self.generation.fetch_add(1, Ordering::Release);
        snapshot
    }

    async fn run_evaluation(&self) -> EmergencySnapshot {
        let current = self.mode();
        let now = Utc::now();

        let transfers = match self.state.latest_or_poll().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.hold(current, now, e.to_string()),
        };
        let ratio = match compute_ratio(&transfers) {
            Ok(ratio) => ratio,
            Err(e) => return self.hold(current, now, e),
        };
        metrics::GOVERNOR_RATIO.set(ratio);

        let next = next_mode(current, ratio, &self.config);
        let mut affected = Vec::new();
        let mut seeding = transfers.count(TransferLifecycle::Seeding);

        if next != current {
            self.transition(current, next, ratio, now).await;
            if next == RatioMode::Emergency {
                match self.control.resume_seedable().await {
                    Ok(report) => {
                        seeding += report.resumed.len();
                        affected.extend(report.resumed);
                    }
                    Err(e) => warn!(error = %e, "Failed to resume seedable transfers"),
                }
                match self.control.restart_stalled().await {
                    Ok(report) => affected.extend(report.restarted),
                    Err(e) => warn!(error = %e, "Failed to restart stalled transfers"),
                }
            }
        }

        let mut inner = self.inner();
        let snapshot = EmergencySnapshot {
            id: Uuid::new_v4(),
            ratio: Some(ratio),
            mode: next,
            entered_at: inner.entered_at,
            evaluated_at: now,
            seeding_allocation: seeding,
            affected,
            error: None,
        };
        self.record(&mut inner, snapshot.clone());
        snapshot
    }

    /// Keep the previous mode after a failed evaluation.
    fn hold(&self, current: RatioMode, now: DateTime<Utc>, reason: String) -> EmergencySnapshot {
        metrics::GOVERNOR_EVALUATION_ERRORS.inc();
        warn!(mode = %current, error = %reason, "Ratio evaluation failed, holding mode");

        let mut inner = self.inner();
        let snapshot = EmergencySnapshot {
            id: Uuid::new_v4(),
            ratio: None,
            mode: current,
            entered_at: inner.entered_at,
            evaluated_at: now,
            seeding_allocation: inner.last.as_ref().map_or(0, |s| s.seeding_allocation),
            affected: Vec::new(),
            error: Some(reason),
        };
        self.record(&mut inner, snapshot.clone());
        snapshot
    }

    async fn transition(&self, from: RatioMode, to: RatioMode, ratio: f64, at: DateTime<Utc>) {
        {
            let mut inner = self.inner();
            inner.entered_at = match to {
                RatioMode::Emergency => Some(at),
                _ => None,
            };
            if inner.transitions.len() >= self.config.history_limit.max(1) {
                inner.transitions.pop_front();
            }
            inner.transitions.push_back(ModeTransition { from, to, ratio, at });
        }

        self.mode.send_replace(to);
        metrics::GOVERNOR_MODE.set(to.gauge_value());
        metrics::GOVERNOR_TRANSITIONS
            .with_label_values(&[to.as_str()])
            .inc();

        match to {
            RatioMode::Emergency => error!(
                from = %from,
                ratio,
                critical = self.config.critical_threshold,
                "Ratio emergency, admitting essential items only"
            ),
            _ => info!(from = %from, to = %to, ratio, "Ratio mode changed"),
        }

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::GovernorModeChanged {
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                    ratio: Some(ratio),
                })
                .await;
        }
    }

    fn record(&self, inner: &mut GovernorState, snapshot: EmergencySnapshot) {
        if inner.history.len() >= self.config.history_limit.max(1) {
            inner.history.pop_front();
        }
        inner.history.push_back(snapshot.clone());
        inner.last = Some(snapshot);
    }

    fn inner(&self) -> MutexGuard<'_, GovernorState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorConfig;
    use crate::testing::{fixtures, MockTorrentClient};
    use crate::torrent_client::{TorrentClientError, TorrentState};
    use std::time::Duration;

    fn config() -> GovernorConfig {
        GovernorConfig {
            critical_threshold: 1.0,
            warning_threshold: 1.1,
            history_limit: 3,
        }
    }

    fn setup(client: &Arc<MockTorrentClient>) -> (Arc<TorrentStateManager>, RatioGovernor) {
        let monitor = MonitorConfig::default();
        let state = Arc::new(TorrentStateManager::new(client.clone(), &monitor));
        let control = Arc::new(TorrentControlManager::new(state.clone(), &monitor));
        (state.clone(), RatioGovernor::new(config(), state, control))
    }

    /// One seeding transfer whose totals give `ratio`.
    fn set_ratio(client: &MockTorrentClient, ratio: f64) {
        client.set_transfer("seed", (ratio * 1000.0).round() as u64, 1000);
    }

    #[test]
    fn test_hysteresis_sequence() {
        let config = config();
        let mut mode = RatioMode::Normal;
        let mut modes = Vec::new();
        for ratio in [1.25, 0.95, 1.05, 1.15] {
            mode = next_mode(mode, ratio, &config);
            modes.push(mode);
        }
        assert_eq!(
            modes,
            vec![
                RatioMode::Normal,
                RatioMode::Emergency,
                RatioMode::Emergency,
                RatioMode::Normal
            ]
        );
    }

    #[test]
    fn test_warning_band_from_normal() {
        let config = config();
        assert_eq!(next_mode(RatioMode::Normal, 1.05, &config), RatioMode::Warning);
        assert_eq!(next_mode(RatioMode::Warning, 1.10, &config), RatioMode::Warning);
        assert_eq!(next_mode(RatioMode::Warning, 1.00, &config), RatioMode::Emergency);
        assert_eq!(next_mode(RatioMode::Warning, 1.2, &config), RatioMode::Normal);
    }

    #[tokio::test]
    async fn test_evaluation_records_transitions() {
        let client = Arc::new(MockTorrentClient::new());
        client.insert_torrent(fixtures::seeding("seed", 0, 0));
        let (state, governor) = setup(&client);
        let mut rx = governor.subscribe();

        for ratio in [1.25, 0.95, 1.05, 1.15] {
            set_ratio(&client, ratio);
            state.poll().await.unwrap();
            governor.evaluate().await;
        }

        let transitions = governor.transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].to, RatioMode::Emergency);
        assert_eq!(transitions[1].from, RatioMode::Emergency);
        assert_eq!(transitions[1].to, RatioMode::Normal);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), RatioMode::Normal);
        // Bounded by history_limit.
        assert_eq!(governor.history().len(), 3);
    }

    #[tokio::test]
    async fn test_entering_emergency_resumes_and_restarts() {
        let client = Arc::new(MockTorrentClient::new());
        client.insert_torrent(fixtures::seeding("seed", 0, 0));
        client.insert_torrent(fixtures::torrent("held", TorrentState::Paused, fixtures::SIZE));
        client.set_transfer("held", 0, 1000);
        let (state, governor) = setup(&client);

        set_ratio(&client, 0.5);
        state.poll().await.unwrap();
        let snapshot = governor.evaluate().await;

        assert_eq!(snapshot.mode, RatioMode::Emergency);
        assert!(snapshot.entered_at.is_some());
        assert_eq!(snapshot.affected, vec!["held".to_string()]);
        assert_eq!(snapshot.seeding_allocation, 2);
        assert_eq!(client.resumed(), vec!["held".to_string()]);
    }

    #[tokio::test]
    async fn test_error_holds_last_mode() {
        let client = Arc::new(MockTorrentClient::new());
        client.insert_torrent(fixtures::seeding("seed", 0, 0));
        let (state, governor) = setup(&client);

        set_ratio(&client, 0.5);
        state.poll().await.unwrap();
        governor.evaluate().await;
        assert_eq!(governor.mode(), RatioMode::Emergency);

        client.set_transfer("seed", 5000, 0);
        state.poll().await.unwrap();
        let snapshot = governor.evaluate().await;
        assert_eq!(snapshot.mode, RatioMode::Emergency);
        assert!(snapshot.ratio.is_none());
        assert!(snapshot.error.is_some());
        assert_eq!(governor.mode(), RatioMode::Emergency);
    }

    #[tokio::test]
    async fn test_unreachable_backend_without_snapshot_holds_normal() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_list_error(Some(TorrentClientError::ConnectionFailed("down".into())));
        let (_state, governor) = setup(&client);

        let snapshot = governor.evaluate().await;
        assert_eq!(snapshot.mode, RatioMode::Normal);
        assert!(snapshot.error.is_some());
        assert!(governor.transitions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_callers_share_one_evaluation() {
        let client = Arc::new(MockTorrentClient::new());
        client.insert_torrent(fixtures::seeding("seed", 2000, 1000));
        client.set_call_delay(Duration::from_millis(50));
        let (_state, governor) = setup(&client);

        let (a, b) = tokio::join!(governor.evaluate(), governor.evaluate());
        assert_eq!(a.id, b.id);
        assert_eq!(governor.history().len(), 1);
    }
}
