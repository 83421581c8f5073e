//! Capture/replay outcome counters.
//!
//! Engine-owned and shared by reference rather than living in process
//! globals; monotonically incremented, reset only on process restart.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for observed captures and replay outcomes.
#[derive(Debug, Default)]
pub struct Counters {
    requests_observed: AtomicU64,
    replays_attempted: AtomicU64,
    replays_succeeded: AtomicU64,
    replays_failed: AtomicU64,
}

/// Point-in-time view of the counters, for inspection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub requests_observed: u64,
    pub replays_attempted: u64,
    pub replays_succeeded: u64,
    pub replays_failed: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_observed(&self) {
        self.requests_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay_attempt(&self) {
        self.replays_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay_success(&self) {
        self.replays_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay_failure(&self) {
        self.replays_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests_observed: self.requests_observed.load(Ordering::Relaxed),
            replays_attempted: self.replays_attempted.load(Ordering::Relaxed),
            replays_succeeded: self.replays_succeeded.load(Ordering::Relaxed),
            replays_failed: self.replays_failed.load(Ordering::Relaxed),
        }
    }
}
