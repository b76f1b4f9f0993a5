//! Encoding quality and the drop-rate driven quality adapter.
//!
//! Quality is a discrete tier in percent, kept in `[MIN, MAX]` and moved
//! in steps of [`Quality::STEP`]. Keeping it integral makes repeated
//! adjustments exact.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::display::drops::DropStats;

// ── Quality ──────────────────────────────────────────────────────

/// JPEG quality in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(50);
    pub const MAX: Quality = Quality(95);
    pub const STEP: u8 = 5;
    /// Quality a fresh session starts at.
    pub const DEFAULT: Quality = Quality(90);

    /// Clamp `percent` into the supported range.
    pub fn new(percent: u8) -> Self {
        Quality(percent.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// One step lower, never below [`Quality::MIN`].
    pub fn step_down(self) -> Self {
        Quality(self.0.saturating_sub(Self::STEP).max(Self::MIN.0))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ── QualityAdapter ───────────────────────────────────────────────

/// Consumer-side throttle.
///
/// After every rendered frame the adapter checks the drop rate. Above
/// [`DROP_RATE_THRESHOLD`](Self::DROP_RATE_THRESHOLD) it lowers quality
/// by one step. It never raises quality on its own; only
/// [`set_manual`](Self::set_manual) can.
#[derive(Debug, Clone)]
pub struct QualityAdapter {
    quality: Quality,
    steps_taken: u32,
}

impl QualityAdapter {
    pub const DROP_RATE_THRESHOLD: f64 = 0.10;

    pub fn new(initial: Quality) -> Self {
        Self {
            quality: initial,
            steps_taken: 0,
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Number of automatic reductions applied so far.
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    /// Re-evaluate after a rendered frame.
    ///
    /// Returns the new quality when it changed.
    pub fn on_frame_rendered(&mut self, stats: &DropStats) -> Option<Quality> {
        let rate = stats.drop_rate();
        if rate > Self::DROP_RATE_THRESHOLD && self.quality > Quality::MIN {
            self.quality = self.quality.step_down();
            self.steps_taken += 1;
            warn!(
                "frame drop rate high: {:.1}%; reducing quality to {}",
                rate * 100.0,
                self.quality
            );
            return Some(self.quality);
        }
        None
    }

    /// User-selected quality. The only path that may raise it.
    pub fn set_manual(&mut self, quality: Quality) {
        self.quality = quality;
    }

    /// Start from the quality the producer is actually encoding at.
    pub fn seed(&mut self, producer: Quality) {
        if producer != self.quality {
            debug!(from = %self.quality, to = %producer, "quality seeded from producer");
        }
        self.quality = producer;
    }
}

impl Default for QualityAdapter {
    fn default() -> Self {
        Self::new(Quality::DEFAULT)
    }
}

// ── Tests ────────────────────────────────────────────────────────
