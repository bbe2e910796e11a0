//! Backend and network-path health.
//!
//! - [`VpnHealthChecker`]: is the tunnel some backends sit behind up?
//! - [`BackendHealthProbe`]: authenticate-then-capability-check per endpoint,
//!   cached for a short TTL so dispatch does not re-login on every call.

mod endpoint;
mod probe;
mod types;
mod vpn;

pub use endpoint::BackendEndpoint;
pub(crate) use endpoint::sort_by_priority;
pub use probe::BackendHealthProbe;
pub use types::{HealthRecord, ProbeStatus};
pub use vpn::{TcpVpnChecker, VpnHealthChecker};
