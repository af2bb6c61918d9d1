//! Session counters.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use framecap_ipc::SessionStats;

/// Collects session counters.
///
/// Shared with encoder event handlers, which may run on worker threads.
#[derive(Debug, Default)]
pub struct StatsCollector {
    started_at: RwLock<Option<f64>>,
    stopped_at: RwLock<Option<f64>>,
    frames_captured: AtomicU64,
    subframes_blended: AtomicU64,
    errors_reported: AtomicU64,
    artifacts_delivered: AtomicU64,
}

impl StatsCollector {
    /// Create a collector with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters and mark the session as started at `now`.
    pub fn start(&self, now: f64) {
        *self.started_at.write() = Some(now);
        *self.stopped_at.write() = None;
        self.frames_captured.store(0, Ordering::Relaxed);
        self.subframes_blended.store(0, Ordering::Relaxed);
        self.errors_reported.store(0, Ordering::Relaxed);
        self.artifacts_delivered.store(0, Ordering::Relaxed);
    }

    /// Freeze elapsed time at `now`.
    pub fn stop(&self, now: f64) {
        if self.started_at.read().is_some() {
            *self.stopped_at.write() = Some(now);
            debug!(elapsed = self.elapsed(now), "Stats stopped");
        }
    }

    /// Record a frame forwarded to the encoder. Returns the new total.
    pub fn record_frame(&self) -> u64 {
        self.frames_captured.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a sub-frame folded into a blurred frame.
    pub fn record_subframe(&self) {
        self.subframes_blended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error reported by the encoder.
    pub fn record_error(&self) {
        self.errors_reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered artifact.
    pub fn record_artifact(&self) {
        self.artifacts_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames forwarded since start.
    pub fn frames(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Seconds between start and `now`, or between start and stop.
    pub fn elapsed(&self, now: f64) -> f64 {
        let Some(started) = *self.started_at.read() else {
            return 0.0;
        };
        let end = self.stopped_at.read().unwrap_or(now);
        (end - started).max(0.0)
    }

    /// Current counters.
    pub fn snapshot(&self, now: f64, logical_ms: f64) -> SessionStats {
        SessionStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            subframes_blended: self.subframes_blended.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            artifacts_delivered: self.artifacts_delivered.load(Ordering::Relaxed),
            elapsed_seconds: self.elapsed(now),
            logical_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_reset_on_start() {
        let stats = StatsCollector::new();
        stats.start(1.0);
        assert_eq!(stats.record_frame(), 1);
        assert_eq!(stats.record_frame(), 2);
        stats.record_error();
        stats.record_artifact();

        let snapshot = stats.snapshot(3.0, 33.0);
        assert_eq!(snapshot.frames_captured, 2);
        assert_eq!(snapshot.errors_reported, 1);
        assert_eq!(snapshot.artifacts_delivered, 1);
        assert_eq!(snapshot.elapsed_seconds, 2.0);
        assert_eq!(snapshot.logical_ms, 33.0);

        stats.start(5.0);
        assert_eq!(stats.snapshot(5.0, 0.0), SessionStats::default());
    }

    #[test]
    fn test_elapsed_freezes_on_stop() {
        let stats = StatsCollector::new();
        assert_eq!(stats.elapsed(10.0), 0.0);

        stats.start(2.0);
        stats.stop(3.5);
        assert_eq!(stats.elapsed(100.0), 1.5);
    }
}
