use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Telemetry counters for one shard. Relaxed atomics, snapshot on read.
#[derive(Debug, Default)]
pub struct ShardStats {
    pub(crate) copy_bursts: AtomicU64,
    pub(crate) copy_fallbacks: AtomicU64,
    pub(crate) deadlock_retries: AtomicU64,
    pub(crate) position_retries: AtomicU64,
}

impl ShardStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            copy_bursts: self.copy_bursts.load(Ordering::Relaxed),
            copy_fallbacks: self.copy_fallbacks.load(Ordering::Relaxed),
            deadlock_retries: self.deadlock_retries.load(Ordering::Relaxed),
            position_retries: self.position_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub copy_bursts: u64,
    pub copy_fallbacks: u64,
    pub deadlock_retries: u64,
    pub position_retries: u64,
}
