//! Sliding-window sampling rate estimate
//!
//! Counts sampled frames (sent or not) and reports frames per second over
//! a caller-chosen window. Used for diagnostics only.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long samples are kept by default
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10);

pub struct PerformanceMonitor {
    samples: VecDeque<Instant>,
    retention: Duration,
    started: Instant,
    total_frames: u64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Monitor that keeps samples for at most `retention`
    pub fn with_retention(retention: Duration) -> Self {
        Self::started_at(Instant::now(), retention)
    }

    pub fn started_at(started: Instant, retention: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            retention,
            started,
            total_frames: 0,
        }
    }

    /// Record one sampled frame at the current instant
    pub fn record_frame(&mut self) {
        self.record_frame_at(Instant::now());
    }

    pub fn record_frame_at(&mut self, now: Instant) {
        self.samples.push_back(now);
        self.total_frames += 1;
        self.prune(now);
    }

    /// Frames per second over the trailing `window`
    pub fn average_rate(&self, window: Duration) -> f64 {
        self.average_rate_at(Instant::now(), window)
    }

    /// Frames per second over `window` ending at `now`.
    ///
    /// Elapsed time is bounded by the monitor's lifetime, so a monitor that
    /// started 0.5s ago reports over 0.5s rather than the full window.
    pub fn average_rate_at(&self, now: Instant, window: Duration) -> f64 {
        let window = window.min(self.retention);
        let elapsed = window.min(now.saturating_duration_since(self.started));
        if elapsed.is_zero() {
            return 0.0;
        }

        let count = self
            .samples
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) <= window)
            .filter(|t| **t <= now)
            .count();

        count as f64 / elapsed.as_secs_f64()
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&t) = self.samples.front() {
            if now.saturating_duration_since(t) > self.retention {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_monitor_returns_zero() {
        let start = Instant::now();
        let monitor = PerformanceMonitor::started_at(start, DEFAULT_RETENTION);
        assert_eq!(monitor.average_rate_at(start, Duration::from_secs(1)), 0.0);
        assert_eq!(
            monitor.average_rate_at(start + Duration::from_secs(5), Duration::from_secs(1)),
            0.0
        );
    }

    #[test]
    fn test_steady_rate() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::started_at(start, DEFAULT_RETENTION);
        // 20 fps for 3 seconds
        for i in 1..=60 {
            monitor.record_frame_at(start + Duration::from_millis(50 * i));
        }
        let now = start + Duration::from_secs(3);
        let rate = monitor.average_rate_at(now, Duration::from_secs(1));
        assert!((rate - 20.0).abs() < 1.5, "rate={rate}");
    }

    #[test]
    fn test_old_samples_leave_window() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::started_at(start, DEFAULT_RETENTION);
        for i in 1..=20 {
            monitor.record_frame_at(start + Duration::from_millis(50 * i));
        }
        // Nothing for the next five seconds
        let now = start + Duration::from_secs(6);
        assert_eq!(monitor.average_rate_at(now, Duration::from_secs(1)), 0.0);
        assert_eq!(monitor.total_frames(), 20);
    }

    #[test]
    fn test_young_monitor_uses_lifetime() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::started_at(start, DEFAULT_RETENTION);
        for i in 1..=10 {
            monitor.record_frame_at(start + Duration::from_millis(50 * i));
        }
        let now = start + Duration::from_millis(500);
        let rate = monitor.average_rate_at(now, Duration::from_secs(1));
        assert!((rate - 20.0).abs() < 0.01, "rate={rate}");
    }

    #[test]
    fn test_retention_prunes() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::started_at(start, Duration::from_millis(300));
        monitor.record_frame_at(start);
        monitor.record_frame_at(start + Duration::from_millis(150));
        monitor.record_frame_at(start + Duration::from_millis(500));
        assert_eq!(monitor.samples.len(), 1);
    }
}
