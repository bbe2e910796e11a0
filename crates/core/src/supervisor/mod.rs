//! Supervisor for the background loops.
//!
//! Owns the monitor cycle (state poll, stall recovery, ratio evaluation,
//! completion detection) and the offline queue drain loop.

mod runner;
mod types;

pub use runner::{MonitorCycle, Supervisor};
pub use types::{CycleReport, SupervisorStatus};
