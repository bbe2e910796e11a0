pub mod audit;
pub mod config;
pub mod dispatch;
pub mod governor;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod supervisor;
pub mod testing;
pub mod torrent_client;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, BackendConfig, BackendRole, Config,
    ConfigError, SanitizedConfig,
};
pub use dispatch::{
    fingerprint_for, AddedItem, DispatchConfig, DispatchError, DispatchItem, DispatchOutcome,
    DispatchRouter, ItemPriority, QueuedItem,
};
pub use governor::{EmergencySnapshot, GovernorConfig, ModeTransition, RatioGovernor, RatioMode};
pub use health::{
    BackendEndpoint, BackendHealthProbe, HealthRecord, ProbeStatus, TcpVpnChecker,
    VpnHealthChecker,
};
pub use monitor::{
    CompletionEvent, CompletionEventManager, CompletionKind, MonitorConfig, Snapshot, StateError,
    TorrentControlManager, TorrentStateManager, TransferLifecycle, TransferState,
};
pub use queue::{DrainReport, OfflineQueue, QueueConfig, QueueError, QueueReason, QueueRecord};
pub use supervisor::{CycleReport, MonitorCycle, Supervisor, SupervisorStatus};
pub use torrent_client::{
    FailureKind, QBittorrentClient, TorrentClient, TorrentClientError, TorrentInfo, TorrentState,
};
