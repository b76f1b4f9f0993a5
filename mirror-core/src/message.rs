//! Bus message types.
//!
//! Every message exchanged between contexts is a variant of the closed
//! [`Message`] union. On a JSON boundary the variant is selected by the
//! `action` field; unknown actions deserialize to [`Message::Unknown`],
//! which receivers log and ignore.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::FrameEnvelope;

// ── ContextId ────────────────────────────────────────────────────

/// Address of an execution context on the message bus (a page, a
/// capture document, the broker, a mirror window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── StreamStats ──────────────────────────────────────────────────

/// Broker-side statistics reported in reply to [`Message::GetStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    /// Whether a session is active.
    pub streaming: bool,
    /// Frames accepted in the current session.
    pub frame_count: u64,
    /// Frames pushed to the bound target.
    pub forwarded: u64,
    /// Frames discarded for a stale or foreign source.
    pub rejected: u64,
    /// Milliseconds since the session started (0 when idle).
    pub uptime: u64,
    pub source_id: Option<ContextId>,
    pub target_id: Option<ContextId>,
}

// ── Message ──────────────────────────────────────────────────────

/// All messages understood by the mirror contexts.
///
/// Grouped by direction:
/// - UI → broker: `OpenMirror`, `CloseMirror`
/// - broker → capture: `StartCapture`, `StopCapture`, `SetQuality`
/// - capture → broker: `FrameUpdate`, `CaptureStopped`
/// - broker → display: `DisplayFrame`
/// - display → broker: `GetFrame`, `IsStreaming`, `GetStats`, `SetQuality`, `MirrorReady`
/// - broker replies: `MirrorOpened`, `MirrorFailed`, `MirrorClosed`,
///   `CurrentFrame`, `StreamingStatus`, `Stats`
/// - host → broker: `WindowRemoved`, `TabRemoved`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    // ── Session control ──────────────────────────────────────────
    /// Start mirroring the page hosted by `source`.
    #[serde(rename_all = "camelCase")]
    OpenMirror { source_id: ContextId },
    /// Tear down the current session and its mirror window.
    CloseMirror,
    #[serde(rename_all = "camelCase")]
    MirrorOpened { window_id: u64, target_id: ContextId },
    MirrorFailed { error: String },
    MirrorClosed,

    // ── Capture control ──────────────────────────────────────────
    #[serde(rename_all = "camelCase")]
    StartCapture { target_id: ContextId, frame_rate: u32 },
    StopCapture,
    /// The capture source is no longer producing frames.
    CaptureStopped { reason: String },
    /// Requested JPEG quality in percent. Automatic requests may only
    /// lower the producer's quality; `manual` ones may also raise it.
    SetQuality {
        quality: u8,
        #[serde(default)]
        manual: bool,
    },

    // ── Frames ───────────────────────────────────────────────────
    FrameUpdate(FrameEnvelope),
    DisplayFrame(FrameEnvelope),
    GetFrame,
    CurrentFrame { frame: Option<FrameEnvelope> },

    // ── Status ───────────────────────────────────────────────────
    IsStreaming,
    StreamingStatus { streaming: bool },
    GetStats,
    Stats(StreamStats),
    MirrorReady,

    // ── Host lifecycle notifications ─────────────────────────────
    #[serde(rename_all = "camelCase")]
    WindowRemoved { window_id: u64 },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: ContextId },

    /// Any action this build does not know.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// The wire `action` tag of this message.
    pub fn action(&self) -> &'static str {
        match self {
            Message::OpenMirror { .. } => "openMirror",
            Message::CloseMirror => "closeMirror",
            Message::MirrorOpened { .. } => "mirrorOpened",
            Message::MirrorFailed { .. } => "mirrorFailed",
            Message::MirrorClosed => "mirrorClosed",
            Message::StartCapture { .. } => "startCapture",
            Message::StopCapture => "stopCapture",
            Message::CaptureStopped { .. } => "captureStopped",
            Message::SetQuality { .. } => "setQuality",
            Message::FrameUpdate(_) => "frameUpdate",
            Message::DisplayFrame(_) => "displayFrame",
            Message::GetFrame => "getFrame",
            Message::CurrentFrame { .. } => "currentFrame",
            Message::IsStreaming => "isStreaming",
            Message::StreamingStatus { .. } => "streamingStatus",
            Message::GetStats => "getStats",
            Message::Stats(_) => "stats",
            Message::MirrorReady => "mirrorReady",
            Message::WindowRemoved { .. } => "windowRemoved",
            Message::TabRemoved { .. } => "tabRemoved",
            Message::Unknown => "unknown",
        }
    }

    /// Parse a JSON message.
    pub fn from_json(text: &str) -> Result<Self, crate::MirrorError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, crate::MirrorError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn frame_update_matches_wire_envelope() {
        let frame = Frame::new(9, 300, vec![0xFF, 0xD8]);
        let msg = Message::FrameUpdate(FrameEnvelope::new(&frame, ContextId(5)));
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["action"], "frameUpdate");
        assert_eq!(json["frame"], "/9g=");
        assert_eq!(json["targetId"], 5);
        assert_eq!(json["sequenceNumber"], 9);
        assert_eq!(json["timestamp"], 300);
    }

    #[test]
    fn parses_known_actions() {
        let msg = Message::from_json(r#"{"action":"startCapture","targetId":4,"frameRate":30}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::StartCapture {
                target_id: ContextId(4),
                frame_rate: 30
            }
        );

        let msg = Message::from_json(r#"{"action":"isStreaming"}"#).unwrap();
        assert_eq!(msg, Message::IsStreaming);
    }

    #[test]
    fn unknown_action_is_not_an_error() {
        let msg = Message::from_json(r#"{"action":"captureTab","extra":1}"#).unwrap();
        assert_eq!(msg, Message::Unknown);
    }

    #[test]
    fn action_names_match_serialized_tags() {
        let msgs = [
            Message::CloseMirror,
            Message::SetQuality { quality: 80, manual: true },
            Message::WindowRemoved { window_id: 3 },
            Message::Stats(StreamStats::default()),
        ];
        for msg in msgs {
            let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert_eq!(json["action"], msg.action());
        }
    }
}
