use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::dispatch::DispatchConfig;
use crate::governor::GovernorConfig;
use crate::monitor::MonitorConfig;
use crate::queue::QueueConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Network path some backends are only reachable through.
    #[serde(default)]
    pub vpn: Option<VpnConfig>,
    /// Backend endpoints, tried in priority order.
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration (audit trail)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("seedwarden.db")
}

/// VPN gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnConfig {
    /// Gateway address as `host:port`; reachable means the tunnel is up.
    pub gateway: String,
    /// Connect timeout in milliseconds (default: 2000)
    #[serde(default = "default_vpn_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vpn_timeout_ms() -> u64 {
    2000
}

/// Role of a backend endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    #[default]
    Primary,
    Secondary,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Primary => "primary",
            BackendRole::Secondary => "secondary",
        }
    }
}

/// A qBittorrent WebUI endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique name used in logs, metrics and status output
    pub name: String,
    /// WebUI base URL (e.g., "http://10.8.0.2:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: BackendRole,
    /// Lower values are tried first
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Only reachable while the VPN is up
    #[serde(default)]
    pub requires_vpn: bool,
    /// HTTP request timeout in seconds (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// How long a session cookie is trusted before re-login (default: 1800)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Category applied to added torrents
    #[serde(default)]
    pub category: Option<String>,
    /// Save path override for added torrents
    #[serde(default)]
    pub download_path: Option<String>,
}

fn default_priority() -> u32 {
    100
}

fn default_timeout() -> u32 {
    10
}

fn default_session_ttl() -> u64 {
    1800
}

impl BackendConfig {
    /// Backend with default options and empty credentials.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            username: String::new(),
            password: String::new(),
            role: BackendRole::default(),
            priority: default_priority(),
            requires_vpn: false,
            timeout_secs: default_timeout(),
            session_ttl_secs: default_session_ttl(),
            category: None,
            download_path: None,
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn: Option<VpnConfig>,
    pub backends: Vec<SanitizedBackendConfig>,
    pub dispatch: DispatchConfig,
    pub queue: QueueConfig,
    pub monitor: MonitorConfig,
    pub governor: GovernorConfig,
}

/// Sanitized backend config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBackendConfig {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub role: BackendRole,
    pub priority: u32,
    pub requires_vpn: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            vpn: config.vpn.clone(),
            backends: config
                .backends
                .iter()
                .map(|b| SanitizedBackendConfig {
                    name: b.name.clone(),
                    url: b.url.clone(),
                    username: b.username.clone(),
                    password_configured: !b.password.is_empty(),
                    role: b.role,
                    priority: b.priority,
                    requires_vpn: b.requires_vpn,
                    timeout_secs: b.timeout_secs,
                })
                .collect(),
            dispatch: config.dispatch.clone(),
            queue: config.queue.clone(),
            monitor: config.monitor.clone(),
            governor: config.governor.clone(),
        }
    }
}
