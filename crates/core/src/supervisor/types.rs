//! Types for the supervisor.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::governor::RatioMode;
use crate::queue::DrainReport;

/// What one monitor cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Sequence of the snapshot the cycle worked on.
    pub snapshot_seq: u64,
    pub transfers: usize,
    pub restarted: Vec<String>,
    pub restart_failures: usize,
    pub mode: RatioMode,
    pub completions: usize,
}

/// Current status of the supervisor loops.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorStatus {
    pub running: bool,
    /// Monitor cycles finished, including failed ones.
    pub cycles: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_error: Option<String>,
    pub last_cycle: Option<CycleReport>,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub last_drain: Option<DrainReport>,
}
