//! Domain-specific error types for the mirror pipeline.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! None of these are fatal to the hosting process: each one is handled at
//! the boundary where it is detected (fallback, drop, or log-and-ignore).

use thiserror::Error;

use crate::message::ContextId;

/// The canonical error type for the mirror pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The user declined the capture prompt.
    #[error("capture permission denied")]
    PermissionDenied,

    /// The capture stream carried no usable video track.
    #[error("capture stream has no video track")]
    NoTrack,

    /// The capture device failed.
    #[error("capture device error: {0}")]
    DeviceError(String),

    /// The underlying track ended (user stopped sharing, tab closed).
    #[error("capture stream ended")]
    StreamEnded,

    /// The requested source cannot be mirrored.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    // ── Relay Errors ─────────────────────────────────────────────
    /// Forwarding to the bound display target failed.
    #[error("target {0} unavailable")]
    TargetUnavailable(ContextId),

    /// The message bus has no context registered under this id.
    #[error("no such context: {0}")]
    NoSuchContext(ContextId),

    /// The destination mailbox is full; the message was dropped.
    #[error("mailbox of {0} is full")]
    MailboxFull(ContextId),

    /// A frame was tagged with a source that is not the current one.
    #[error("session mismatch: expected source {expected}, got {actual}")]
    SessionMismatch {
        expected: ContextId,
        actual: ContextId,
    },

    // ── Codec Errors ─────────────────────────────────────────────
    /// A received payload could not be decoded into an image.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// An image could not be encoded.
    #[error("encode failure: {0}")]
    EncodeFailure(String),

    // ── Plumbing ─────────────────────────────────────────────────
    /// The IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The operation was cancelled by its session token.
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Whether this error should make the capture source fall back to the
    /// viewport-screenshot strategy.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            MirrorError::PermissionDenied | MirrorError::NoTrack | MirrorError::DeviceError(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MirrorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MirrorError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for MirrorError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            MirrorError::Cancelled
        } else {
            MirrorError::Other(format!("task panicked: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = MirrorError::TargetUnavailable(ContextId(7));
        assert!(e.to_string().contains('7'));

        let e = MirrorError::SessionMismatch {
            expected: ContextId(1),
            actual: ContextId(2),
        };
        assert!(e.to_string().contains("expected source 1"));
    }

    #[test]
    fn fallback_classification() {
        assert!(MirrorError::PermissionDenied.triggers_fallback());
        assert!(MirrorError::NoTrack.triggers_fallback());
        assert!(MirrorError::DeviceError("gone".into()).triggers_fallback());
        assert!(!MirrorError::StreamEnded.triggers_fallback());
        assert!(!MirrorError::Cancelled.triggers_fallback());
    }

    #[test]
    fn from_string() {
        let e: MirrorError = "something broke".into();
        assert!(matches!(e, MirrorError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: MirrorError = io_err.into();
        assert!(matches!(e, MirrorError::Io(_)));
    }
}
