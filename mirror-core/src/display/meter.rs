//! Rolling frame-rate meter.
//!
//! Counts frames painted over the most recent window (one second by
//! default).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct FrameRateMeter {
    samples: VecDeque<Instant>,
    window: Duration,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
        }
    }

    /// Record a painted frame now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant) {
        self.samples.push_back(when);
        self.evict(when);
    }

    /// Frames per second over the window, as of `now`.
    pub fn fps_at(&mut self, now: Instant) -> f64 {
        self.evict(now);
        self.samples.len() as f64 / self.window.as_secs_f64()
    }

    pub fn fps(&mut self) -> f64 {
        self.fps_at(Instant::now())
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&ts) = self.samples.front() {
            if now.saturating_duration_since(ts) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_reads_zero() {
        let mut m = FrameRateMeter::new();
        assert_eq!(m.fps(), 0.0);
    }

    #[test]
    fn counts_frames_in_window() {
        let mut m = FrameRateMeter::new();
        let t0 = Instant::now();
        for i in 0..30 {
            m.record_at(t0 + Duration::from_millis(i * 33));
        }
        assert_eq!(m.fps_at(t0 + Duration::from_millis(990)), 30.0);
    }

    #[test]
    fn old_frames_expire() {
        let mut m = FrameRateMeter::new();
        let t0 = Instant::now();
        for i in 0..10 {
            m.record_at(t0 + Duration::from_millis(i * 10));
        }
        assert_eq!(m.fps_at(t0 + Duration::from_secs(3)), 0.0);
    }
}
