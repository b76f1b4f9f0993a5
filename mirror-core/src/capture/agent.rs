//! The capture context's message loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Envelope, Mailbox, MessageBus};
use crate::capture::source::CaptureSource;
use crate::message::{ContextId, Message};
use crate::quality::Quality;

/// Drives a [`CaptureSource`] from broker commands.
///
/// Only the broker may control capture; anything else is logged and
/// ignored.
pub struct CaptureAgent {
    source: CaptureSource,
    bus: Arc<dyn MessageBus>,
}

impl CaptureAgent {
    pub fn new(source: CaptureSource, bus: Arc<dyn MessageBus>) -> Self {
        Self { source, bus }
    }

    pub fn id(&self) -> ContextId {
        self.source.id()
    }

    pub fn source(&self) -> &CaptureSource {
        &self.source
    }

    /// Run until `cancel` fires or the mailbox closes. Capture is stopped
    /// on the way out.
    pub async fn run(mut self, mut mailbox: Mailbox, cancel: CancellationToken) {
        info!(id = %self.id(), "capture agent started");
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                envelope = mailbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.handle(envelope) => {}
            }
        }
        self.source.stop();
        info!(id = %self.id(), "capture agent stopped");
    }

    /// Apply one message.
    pub async fn handle(&mut self, envelope: Envelope) {
        let Envelope { from, message } = envelope;
        if from != self.source.broker() {
            debug!(%from, action = message.action(), "capture command from non-broker ignored");
            return;
        }

        match message {
            Message::StartCapture { target_id, frame_rate } => {
                let rate = (frame_rate > 0).then_some(frame_rate);
                if let Err(e) = self.source.start(target_id, rate).await {
                    warn!(target = %target_id, "capture failed to start: {e}");
                    self.bus.post(
                        self.source.id(),
                        from,
                        Message::CaptureStopped {
                            reason: e.to_string(),
                        },
                    );
                }
            }
            Message::StopCapture => {
                self.source.stop();
            }
            Message::SetQuality { quality, manual } => {
                let requested = Quality::new(quality);
                let current = self.source.quality();
                if !manual && requested > current {
                    debug!(%requested, %current, "automatic quality raise refused");
                } else {
                    self.source.set_quality(requested);
                }
            }
            other => debug!(action = other.action(), "ignored by capture agent"),
        }
    }
}
