//! Per-session relay state.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::MirrorError;
use crate::frame::FrameEnvelope;
use crate::message::{ContextId, StreamStats};
use crate::relay::buffer::RelayBuffer;

/// What the broker should do with a submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Stored and should be pushed to this target.
    Forward(ContextId),
    /// Stored; no target is bound.
    Stored,
    /// Discarded.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The session has been stopped.
    Inactive,
    /// The sender is not the session's source.
    ForeignSource,
    /// The frame is addressed to a target that is no longer bound.
    StaleTarget,
}

/// The binding between one capture source and one display target.
///
/// Owns every piece of session-scoped relay state. A new session is a new
/// value; nothing survives teardown.
#[derive(Debug)]
pub struct RelaySession {
    source: ContextId,
    target: Option<ContextId>,
    started_at: Instant,
    active: bool,
    buffer: RelayBuffer,
    accepted: u64,
    forwarded: u64,
    rejected: u64,
}

impl RelaySession {
    pub fn new(source: ContextId, target: Option<ContextId>) -> Self {
        Self {
            source,
            target,
            started_at: Instant::now(),
            active: true,
            buffer: RelayBuffer::new(),
            accepted: 0,
            forwarded: 0,
            rejected: 0,
        }
    }

    pub fn source(&self) -> ContextId {
        self.source
    }

    pub fn target(&self) -> Option<ContextId> {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn uptime(&self) -> Duration {
        if self.active {
            self.started_at.elapsed()
        } else {
            Duration::ZERO
        }
    }

    /// Stop accepting frames. The last frame stays readable.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Bind a (new) display target.
    ///
    /// Rebinding to a different target starts over: counters and the
    /// pending frame are reset so the new target never sees frames
    /// addressed to the old one.
    pub fn bind_target(&mut self, target: ContextId) {
        if self.target == Some(target) {
            return;
        }
        self.target = Some(target);
        self.started_at = Instant::now();
        self.buffer.clear();
        self.accepted = 0;
        self.forwarded = 0;
        self.rejected = 0;
    }

    /// `Ok` when `from` is this session's source.
    pub fn check_source(&self, from: ContextId) -> Result<(), MirrorError> {
        if from == self.source {
            Ok(())
        } else {
            Err(MirrorError::SessionMismatch {
                expected: self.source,
                actual: from,
            })
        }
    }

    /// Accept or reject a frame from `from`.
    pub fn submit(&mut self, from: ContextId, frame: FrameEnvelope) -> SubmitOutcome {
        let reason = if !self.active {
            Some(RejectReason::Inactive)
        } else if self.check_source(from).is_err() {
            Some(RejectReason::ForeignSource)
        } else if self.target.is_some_and(|t| t != frame.target_id) {
            Some(RejectReason::StaleTarget)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(
                %from,
                source = %self.source,
                seq = frame.sequence_number,
                ?reason,
                "frame discarded"
            );
            // Foreign senders must not move any session counter.
            if reason != RejectReason::ForeignSource {
                self.rejected += 1;
            }
            return SubmitOutcome::Rejected(reason);
        }

        self.buffer.put(frame);
        self.accepted += 1;
        match self.target {
            Some(target) => SubmitOutcome::Forward(target),
            None => SubmitOutcome::Stored,
        }
    }

    /// Record a successful push to the target.
    pub fn record_forwarded(&mut self) {
        self.forwarded += 1;
    }

    pub fn current_frame(&self) -> Option<&FrameEnvelope> {
        self.buffer.latest()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            streaming: self.active,
            frame_count: self.accepted,
            forwarded: self.forwarded,
            rejected: self.rejected,
            uptime: self.uptime().as_millis() as u64,
            source_id: Some(self.source),
            target_id: self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    const SOURCE: ContextId = ContextId(1);
    const TARGET: ContextId = ContextId(2);

    fn env(seq: u64, target: ContextId) -> FrameEnvelope {
        FrameEnvelope::new(&Frame::new(seq, seq * 33, vec![0xAB]), target)
    }

    #[test]
    fn accepts_from_source_and_forwards() {
        let mut s = RelaySession::new(SOURCE, Some(TARGET));
        assert_eq!(s.submit(SOURCE, env(0, TARGET)), SubmitOutcome::Forward(TARGET));
        assert_eq!(s.accepted(), 1);
    }

    #[test]
    fn foreign_source_changes_nothing() {
        let mut s = RelaySession::new(SOURCE, Some(TARGET));
        s.submit(SOURCE, env(0, TARGET));
        let before = s.stats();

        let outcome = s.submit(ContextId(99), env(7, TARGET));
        assert_eq!(outcome, SubmitOutcome::Rejected(RejectReason::ForeignSource));
        assert_eq!(s.current_frame().unwrap().sequence_number, 0);
        assert_eq!(s.stats().frame_count, before.frame_count);
        assert_eq!(s.stats().rejected, before.rejected);
    }

    #[test]
    fn check_source_reports_mismatch() {
        let s = RelaySession::new(SOURCE, Some(TARGET));
        assert!(s.check_source(SOURCE).is_ok());
        assert!(matches!(
            s.check_source(ContextId(99)),
            Err(MirrorError::SessionMismatch { expected: SOURCE, actual: ContextId(99) })
        ));
    }

    #[test]
    fn stale_target_is_rejected() {
        let mut s = RelaySession::new(SOURCE, Some(TARGET));
        let outcome = s.submit(SOURCE, env(0, ContextId(50)));
        assert_eq!(outcome, SubmitOutcome::Rejected(RejectReason::StaleTarget));
        assert!(s.current_frame().is_none());
    }

    #[test]
    fn unbound_target_stores_only() {
        let mut s = RelaySession::new(SOURCE, None);
        assert_eq!(s.submit(SOURCE, env(0, TARGET)), SubmitOutcome::Stored);
        assert!(s.current_frame().is_some());
    }

    #[test]
    fn rebinding_resets_counters() {
        let mut s = RelaySession::new(SOURCE, Some(TARGET));
        s.submit(SOURCE, env(0, TARGET));
        s.record_forwarded();

        s.bind_target(ContextId(3));
        let stats = s.stats();
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.forwarded, 0);
        assert!(s.current_frame().is_none());
        assert_eq!(s.target(), Some(ContextId(3)));
    }

    #[test]
    fn inactive_session_rejects() {
        let mut s = RelaySession::new(SOURCE, Some(TARGET));
        s.deactivate();
        assert_eq!(
            s.submit(SOURCE, env(0, TARGET)),
            SubmitOutcome::Rejected(RejectReason::Inactive)
        );
        assert_eq!(s.uptime(), Duration::ZERO);
    }
}
