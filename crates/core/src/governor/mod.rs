//! Ratio governance.
//!
//! [`RatioGovernor`] turns the aggregate upload/download ratio into a
//! [`RatioMode`] and publishes it on a watch channel. During an emergency
//! the dispatch router admits only essential items.

mod config;
mod ratio;
mod types;

pub use config::GovernorConfig;
pub use ratio::{compute_ratio, next_mode, RatioGovernor};
pub use types::{EmergencySnapshot, ModeTransition, RatioMode};
