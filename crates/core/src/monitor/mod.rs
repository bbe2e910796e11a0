//! Transfer supervision for one backend.
//!
//! [`TorrentStateManager`] polls and classifies transfers. The control and
//! completion managers act on the snapshots it publishes.

mod completion;
mod config;
mod control;
mod state;
mod types;

pub use completion::CompletionEventManager;
pub use config::MonitorConfig;
pub use control::{ControlFailure, RestartReport, ResumeReport, TorrentControlManager};
pub use state::TorrentStateManager;
pub use types::{
    CompletionEvent, CompletionKind, Snapshot, StateError, TransferLifecycle, TransferState,
};
