//! Mock VPN checker for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::health::VpnHealthChecker;

/// VPN checker whose answer is set by the test.
#[derive(Debug)]
pub struct MockVpnChecker {
    up: AtomicBool,
    checks: AtomicUsize,
}

impl MockVpnChecker {
    pub fn up() -> Self {
        Self {
            up: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn down() -> Self {
        Self {
            up: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VpnHealthChecker for MockVpnChecker {
    async fn is_up(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.up.load(Ordering::SeqCst)
    }
}
