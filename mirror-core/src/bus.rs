//! Inter-context message bus.
//!
//! [`MessageBus`] is the seam to the host's transport: `send` delivers a
//! message to one context, at most once, preserving order per sender.
//! [`LocalBus`] is the in-process implementation: one bounded mpsc
//! mailbox per registered context.
//!
//! Sends never block. A full mailbox drops the message, which is the
//! same best-effort contract the host transport offers.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::MirrorError;
use crate::message::{ContextId, Message};

/// Default mailbox depth for [`LocalBus`] contexts.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

// ── Envelope ─────────────────────────────────────────────────────

/// A delivered message together with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: ContextId,
    pub message: Message,
}

/// Receiving half of a context's mailbox.
pub type Mailbox = mpsc::Receiver<Envelope>;

// ── MessageBus ───────────────────────────────────────────────────

/// Transport between contexts.
pub trait MessageBus: Send + Sync {
    /// Deliver `message` from `from` to `to`.
    ///
    /// Fails with [`MirrorError::NoSuchContext`] when `to` is not
    /// registered. Never blocks.
    fn send(&self, from: ContextId, to: ContextId, message: Message) -> Result<(), MirrorError>;

    /// Fire-and-forget send: failures are logged, never retried.
    fn post(&self, from: ContextId, to: ContextId, message: Message) {
        let action = message.action();
        if let Err(e) = self.send(from, to, message) {
            debug!(%from, %to, action, "send failed: {e}");
        }
    }
}

// ── LocalBus ─────────────────────────────────────────────────────

/// In-process bus with one bounded mailbox per context.
pub struct LocalBus {
    routes: RwLock<HashMap<ContextId, mpsc::Sender<Envelope>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Create a bus whose mailboxes hold at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register `id` and return its mailbox.
    ///
    /// Re-registering an id replaces the previous mailbox; the old
    /// receiver sees its channel close.
    pub fn register(&self, id: ContextId) -> Mailbox {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        debug!(%id, "context registered");
        rx
    }

    /// Remove `id`. Later sends to it fail with `NoSuchContext`.
    pub fn unregister(&self, id: ContextId) {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if removed.is_some() {
            debug!(%id, "context unregistered");
        }
    }

    pub fn is_registered(&self, id: ContextId) -> bool {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for LocalBus {
    fn send(&self, from: ContextId, to: ContextId, message: Message) -> Result<(), MirrorError> {
        let tx = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&to)
            .cloned()
            .ok_or(MirrorError::NoSuchContext(to))?;

        match tx.try_send(Envelope { from, message }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(MirrorError::MailboxFull(to)),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Receiver dropped without unregistering.
                self.unregister(to);
                Err(MirrorError::NoSuchContext(to))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn delivers_with_sender() {
        let bus = LocalBus::new();
        let mut rx = bus.register(ContextId(2));

        bus.send(ContextId(1), ContextId(2), Message::IsStreaming)
            .unwrap();

        let env = rx.recv().await.unwrap();
        assert_eq!(env.from, ContextId(1));
        assert_eq!(env.message, Message::IsStreaming);
    }

    #[test]
    fn unknown_context_fails() {
        let bus = LocalBus::new();
        let err = bus
            .send(ContextId(1), ContextId(9), Message::StopCapture)
            .unwrap_err();
        assert!(matches!(err, MirrorError::NoSuchContext(ContextId(9))));
    }

    #[tokio::test]
    async fn preserves_order_per_sender() {
        let bus = LocalBus::new();
        let mut rx = bus.register(ContextId(2));
        for q in 50..60u8 {
            assert_ok!(bus.send(ContextId(1), ContextId(2), Message::SetQuality { quality: q, manual: false }));
        }
        for q in 50..60u8 {
            let env = rx.recv().await.unwrap();
            assert_eq!(env.message, Message::SetQuality { quality: q, manual: false });
        }
    }

    #[test]
    fn full_mailbox_drops_instead_of_blocking() {
        let bus = LocalBus::with_capacity(1);
        let _rx = bus.register(ContextId(2));
        assert_ok!(bus.send(ContextId(1), ContextId(2), Message::GetFrame));
        let err = assert_err!(bus.send(ContextId(1), ContextId(2), Message::GetFrame));
        assert!(matches!(err, MirrorError::MailboxFull(_)));
    }

    #[test]
    fn dropped_mailbox_unregisters() {
        let bus = LocalBus::new();
        let rx = bus.register(ContextId(2));
        drop(rx);
        assert!(bus.send(ContextId(1), ContextId(2), Message::GetFrame).is_err());
        assert!(!bus.is_registered(ContextId(2)));
    }

    #[test]
    fn post_swallows_errors() {
        let bus = LocalBus::new();
        bus.post(ContextId(1), ContextId(42), Message::StopCapture);
    }
}
