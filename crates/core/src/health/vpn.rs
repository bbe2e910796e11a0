//! VPN path health.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::VpnConfig;

/// Reports whether the network path to VPN-only backends is currently up.
#[async_trait]
pub trait VpnHealthChecker: Send + Sync {
    async fn is_up(&self) -> bool;
}

/// Treats the tunnel as up when a TCP connection to the gateway succeeds
/// within the timeout.
#[derive(Debug, Clone)]
pub struct TcpVpnChecker {
    gateway: String,
    timeout: Duration,
}

impl TcpVpnChecker {
    pub fn new(gateway: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway: gateway.into(),
            timeout,
        }
    }

    pub fn from_config(config: &VpnConfig) -> Self {
        Self::new(
            config.gateway.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl VpnHealthChecker for TcpVpnChecker {
    async fn is_up(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.gateway)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(gateway = %self.gateway, error = %e, "VPN gateway unreachable");
                false
            }
            Err(_) => {
                debug!(gateway = %self.gateway, "VPN gateway connect timed out");
                false
            }
        }
    }
}
