use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Statistics for the dispatch orchestrator
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Events handed to the orchestrator
    pub received: AtomicU64,
    /// Messages accepted by the delivery gateway
    pub delivered: AtomicU64,
    /// Messages the delivery gateway rejected
    pub delivery_failed: AtomicU64,
    /// Events with no registered template
    pub unmatched: AtomicU64,
    /// Events lost to context or render errors
    pub aborted: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub received: u64,
    pub delivered: u64,
    pub delivery_failed: u64,
    pub unmatched: u64,
    pub aborted: u64,
}
