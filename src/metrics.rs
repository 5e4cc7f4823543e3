/// Point-in-time resource usage of the supervised process.
use crate::process::ProcessHandle;
use std::time::Instant;

/// One sample, taken once per tick and dropped after evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub memory_bytes: u64,
    pub cpu_time_ms: f64,
    pub wall_time_ms: f64,
}

impl MetricsSnapshot {
    /// Read the counters from the handle's most recent refresh.
    ///
    /// Wall time is measured against `now` so that all three values describe
    /// the same tick.
    pub fn capture<H: ProcessHandle + ?Sized>(handle: &H, now: Instant) -> Self {
        let wall = now.saturating_duration_since(handle.start_time());
        Self {
            memory_bytes: handle.memory_bytes(),
            cpu_time_ms: handle.cpu_time_ms().max(0.0),
            wall_time_ms: wall.as_secs_f64() * 1000.0,
        }
    }

    /// Memory in MiB, for display.
    pub fn memory_mib(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}
