//! Injected clock for record timestamps and the age sweep.

use chrono::Utc;

/// Millisecond clock capability. Injected into the correlator so that
/// age-based behavior is testable without waiting on wall time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis() as u64
    }
}
