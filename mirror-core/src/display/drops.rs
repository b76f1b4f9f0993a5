//! Consumer-side drop detection from sequence-number gaps.
//!
//! An estimate, not ground truth: frames superseded in the broker's slot
//! and frames lost in transit look the same. Delivery is assumed to be in
//! order; a sequence number at or below the last one seen is counted as
//! received but adds no gap.

use tracing::warn;

/// Counters reset at the start of every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    pub total_received: u64,
    pub estimated_dropped: u64,
}

impl DropStats {
    /// `estimated_dropped / max(total_received, 1)`.
    pub fn drop_rate(&self) -> f64 {
        self.estimated_dropped as f64 / self.total_received.max(1) as f64
    }

    pub fn health(&self) -> DropHealth {
        DropHealth::classify(self.drop_rate())
    }
}

/// Coarse drop-rate bands shown next to the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropHealth {
    /// Under 2 %.
    Healthy,
    /// Under 10 %.
    Acceptable,
    Problematic,
}

impl DropHealth {
    pub fn classify(rate: f64) -> Self {
        if rate < 0.02 {
            DropHealth::Healthy
        } else if rate < 0.10 {
            DropHealth::Acceptable
        } else {
            DropHealth::Problematic
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropDetector {
    last_sequence: Option<u64>,
    stats: DropStats,
}

impl DropDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a received frame. Returns the gap it revealed.
    pub fn observe(&mut self, sequence: u64) -> u64 {
        self.stats.total_received += 1;

        let expected = self.last_sequence.map_or(0, |last| last + 1);
        let gap = sequence.saturating_sub(expected);
        if gap > 0 {
            self.stats.estimated_dropped += gap;
            warn!(
                "detected {gap} dropped frames: {expected} to {}",
                sequence - 1
            );
        }

        if self.last_sequence.is_none_or(|last| sequence > last) {
            self.last_sequence = Some(sequence);
        }
        gap
    }

    /// A frame that arrived but could not be decoded.
    pub fn record_undecodable(&mut self) {
        self.stats.estimated_dropped += 1;
    }

    /// Sequence number of the newest frame seen, `None` before the first.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn stats(&self) -> DropStats {
        self.stats
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
