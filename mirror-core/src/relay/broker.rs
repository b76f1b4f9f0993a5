//! The frame broker.
//!
//! Owns the (at most one) [`RelaySession`] and pushes accepted frames to
//! the bound display target over the message bus. Delivery is
//! best-effort: a failed push is logged as
//! [`TargetUnavailable`](MirrorError::TargetUnavailable) and the frame is
//! dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::error::MirrorError;
use crate::frame::FrameEnvelope;
use crate::message::{ContextId, Message, StreamStats};
use crate::relay::session::{RelaySession, SubmitOutcome};

pub struct Broker {
    /// The broker's own bus address, used as the sender of pushes.
    id: ContextId,
    bus: Arc<dyn MessageBus>,
    session: Option<RelaySession>,
}

impl Broker {
    pub fn new(id: ContextId, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            id,
            bus,
            session: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Replace any existing session with a fresh one.
    pub fn begin_session(&mut self, source: ContextId, target: Option<ContextId>) {
        if let Some(old) = self.session.take() {
            debug!(source = %old.source(), "previous session discarded");
        }
        info!(%source, target = ?target, "relay session started");
        self.session = Some(RelaySession::new(source, target));
    }

    /// Drop the session entirely.
    pub fn end_session(&mut self) -> Option<RelaySession> {
        let ended = self.session.take();
        if let Some(s) = &ended {
            info!(source = %s.source(), frames = s.accepted(), "relay session ended");
        }
        ended
    }

    /// Keep the session for inspection but stop accepting frames.
    pub fn deactivate(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.deactivate();
        }
    }

    /// Bind the display target of the current session.
    pub fn bind_target(&mut self, target: ContextId) {
        match self.session.as_mut() {
            Some(s) => s.bind_target(target),
            None => debug!(%target, "bind_target without a session ignored"),
        }
    }

    /// Accept a frame from `from` and push it to the bound target.
    ///
    /// Frames from anything but the current source are dropped silently.
    pub fn submit(&mut self, from: ContextId, frame: FrameEnvelope) -> SubmitOutcome {
        let Some(session) = self.session.as_mut() else {
            debug!(%from, "frame without a session discarded");
            return SubmitOutcome::Rejected(crate::relay::RejectReason::Inactive);
        };

        let outcome = session.submit(from, frame.clone());
        if let SubmitOutcome::Forward(target) = outcome {
            match push(self.bus.as_ref(), self.id, target, frame) {
                Ok(()) => session.record_forwarded(),
                Err(e) => warn!("frame not delivered: {e}"),
            }
        }
        outcome
    }

    /// Latest accepted frame, for pull-based consumers.
    pub fn current_frame(&self) -> Option<&FrameEnvelope> {
        self.session.as_ref().and_then(|s| s.current_frame())
    }

    pub fn session(&self) -> Option<&RelaySession> {
        self.session.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn stats(&self) -> StreamStats {
        self.session
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }
}

/// Push `frame` to `target`. A target that is gone or closed is
/// [`MirrorError::TargetUnavailable`].
fn push(
    bus: &dyn MessageBus,
    from: ContextId,
    target: ContextId,
    frame: FrameEnvelope,
) -> Result<(), MirrorError> {
    bus.send(from, target, Message::DisplayFrame(frame))
        .map_err(|e| match e {
            MirrorError::NoSuchContext(_) | MirrorError::ChannelClosed => {
                MirrorError::TargetUnavailable(target)
            }
            other => other,
        })
}
