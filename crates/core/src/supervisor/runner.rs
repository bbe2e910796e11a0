//! Background loops: transfer supervision and offline queue replay.
//!
//! - Monitor: poll, restart stalled, evaluate ratio, diff completions. One
//!   cycle at a time, each bounded by the cycle timeout.
//! - Drain: replay the offline queue through the router on an interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::types::{CycleReport, SupervisorStatus};
use crate::dispatch::DispatchRouter;
use crate::governor::RatioGovernor;
use crate::metrics;
use crate::monitor::{
    CompletionEventManager, MonitorConfig, StateError, TorrentControlManager, TorrentStateManager,
};
use crate::queue::QueueConfig;

/// The components one monitor cycle drives.
pub struct MonitorCycle {
    pub state: Arc<TorrentStateManager>,
    pub control: Arc<TorrentControlManager>,
    pub governor: Arc<RatioGovernor>,
    pub completion: Arc<CompletionEventManager>,
}

impl MonitorCycle {
    /// Run one cycle. A failed poll ends the cycle; the governor and
    /// completion steps never see a snapshot older than the one polled here.
    pub async fn run(&self) -> Result<CycleReport, StateError> {
        let snapshot = self.state.poll().await?;
        let restart = self.control.restart_stalled().await?;
        let evaluation = self.governor.evaluate().await;
        let completions = self.completion.poll().await?;

        Ok(CycleReport {
            snapshot_seq: snapshot.seq,
            transfers: snapshot.transfers.len(),
            restarted: restart.restarted,
            restart_failures: restart.failed.len(),
            mode: evaluation.mode,
            completions: completions.len(),
        })
    }
}

struct Intervals {
    poll: Duration,
    cycle_timeout: Duration,
    drain: Duration,
}

/// Owns the monitor and drain loops.
///
/// `start` spawns both; `stop` cancels the shared token and waits for them.
/// The token is the same one handed to the router and control manager, so
/// a stop also interrupts an in-progress dispatch or restart pass between
/// steps.
pub struct Supervisor {
    cycle: Arc<MonitorCycle>,
    router: Arc<DispatchRouter>,
    intervals: Intervals,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    status: Arc<StdMutex<SupervisorStatus>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        cycle: MonitorCycle,
        router: Arc<DispatchRouter>,
        monitor: &MonitorConfig,
        queue: &QueueConfig,
    ) -> Self {
        Self {
            cycle: Arc::new(cycle),
            router,
            intervals: Intervals {
                poll: monitor.poll_interval(),
                cycle_timeout: monitor.cycle_timeout(),
                drain: Duration::from_secs(queue.drain_interval_secs.max(1)),
            },
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(StdMutex::new(SupervisorStatus::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cycle(&self) -> &Arc<MonitorCycle> {
        &self.cycle
    }

    /// Start the background loops. Does nothing if already started or
    /// already stopped.
    pub async fn start(&self) {
        if self.cancel.is_cancelled() {
            warn!("Supervisor was stopped and cannot be restarted");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Supervisor already running");
            return;
        }

        info!(
            poll_interval_secs = self.intervals.poll.as_secs(),
            drain_interval_secs = self.intervals.drain.as_secs(),
            "Starting supervisor"
        );
        lock(&self.status).running = true;

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_monitor_loop());
        tasks.push(self.spawn_drain_loop());
    }

    /// Cancel both loops and wait for them to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping supervisor");
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Supervisor task panicked");
            }
        }
        lock(&self.status).running = false;
        info!("Supervisor stopped");
    }

    pub fn status(&self) -> SupervisorStatus {
        lock(&self.status).clone()
    }

    fn spawn_monitor_loop(&self) -> JoinHandle<()> {
        let cycle = Arc::clone(&self.cycle);
        let status = Arc::clone(&self.status);
        let cancel = self.cancel.clone();
        let period = self.intervals.poll;
        let cycle_timeout = self.intervals.cycle_timeout;

        tokio::spawn(async move {
            info!("Monitor loop started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let started = Instant::now();
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = tokio::time::timeout(cycle_timeout, cycle.run()) => result,
                };
                let elapsed = started.elapsed().as_secs_f64();

                let mut guard = lock(&status);
                guard.cycles += 1;
                guard.last_cycle_at = Some(Utc::now());
                match result {
                    Ok(Ok(report)) => {
                        metrics::MONITOR_CYCLE_DURATION
                            .with_label_values(&["ok"])
                            .observe(elapsed);
                        debug!(
                            seq = report.snapshot_seq,
                            transfers = report.transfers,
                            mode = %report.mode,
                            "Monitor cycle finished"
                        );
                        guard.last_cycle_error = None;
                        guard.last_cycle = Some(report);
                    }
                    Ok(Err(e)) => {
                        metrics::MONITOR_CYCLE_DURATION
                            .with_label_values(&["error"])
                            .observe(elapsed);
                        warn!(error = %e, "Monitor cycle failed");
                        guard.last_cycle_error = Some(e.to_string());
                    }
                    Err(_) => {
                        metrics::MONITOR_CYCLE_DURATION
                            .with_label_values(&["timeout"])
                            .observe(elapsed);
                        warn!(timeout_secs = cycle_timeout.as_secs(), "Monitor cycle timed out");
                        guard.last_cycle_error = Some("cycle timed out".to_string());
                    }
                }
            }
            info!("Monitor loop stopped");
        })
    }

    fn spawn_drain_loop(&self) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let status = Arc::clone(&self.status);
        let cancel = self.cancel.clone();
        let period = self.intervals.drain;

        tokio::spawn(async move {
            info!("Queue drain loop started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if router.queue().is_empty().await {
                    continue;
                }

                match router.drain_queue().await {
                    Ok(report) => {
                        let mut guard = lock(&status);
                        guard.last_drain_at = Some(Utc::now());
                        guard.last_drain = Some(report);
                    }
                    Err(e) => error!(error = %e, "Offline queue drain failed"),
                }
            }
            info!("Queue drain loop stopped");
        })
    }
}

fn lock(status: &StdMutex<SupervisorStatus>) -> MutexGuard<'_, SupervisorStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}
