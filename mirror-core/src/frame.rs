//! Frame types shared by every stage of the relay.
//!
//! [`Frame`] is the in-process representation: encoded JPEG bytes plus
//! sequence metadata. [`FrameEnvelope`] is the same frame addressed to a
//! display target, and is what travels inside bus messages. On a JSON
//! boundary the payload is carried as base64 text.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::message::ContextId;
use crate::quality::Quality;

// ── Frame ────────────────────────────────────────────────────────

/// One independently encoded still image.
///
/// Created by the capture source and read-only afterwards. Cloning is
/// cheap: the payload is reference-counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the session's capture sequence. Starts at 0.
    pub sequence_number: u64,
    /// Monotonic capture time in milliseconds since capture start.
    pub timestamp_ms: u64,
    /// Encoded image bytes (JPEG).
    pub data: Bytes,
}

impl Frame {
    pub fn new(sequence_number: u64, timestamp_ms: u64, data: impl Into<Bytes>) -> Self {
        Self {
            sequence_number,
            timestamp_ms,
            data: data.into(),
        }
    }

    /// Encoded payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── FrameEnvelope ────────────────────────────────────────────────

/// A frame addressed to a display target.
///
/// Serialized form (inside a message carrying `action`):
/// ```text
/// { "frame": "<base64 jpeg>", "targetId": 12, "sequenceNumber": 4, "timestamp": 133, "quality": 90 }
/// ```
///
/// `quality` is the setting the frame was encoded at; it is omitted when
/// unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEnvelope {
    #[serde(with = "base64_payload")]
    pub frame: Bytes,
    pub target_id: ContextId,
    pub sequence_number: u64,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

impl FrameEnvelope {
    /// Address `frame` to `target`.
    pub fn new(frame: &Frame, target: ContextId) -> Self {
        Self {
            frame: frame.data.clone(),
            target_id: target,
            sequence_number: frame.sequence_number,
            timestamp: frame.timestamp_ms,
            quality: None,
        }
    }

    /// Tag the envelope with the quality it was encoded at.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// The frame carried by this envelope.
    pub fn to_frame(&self) -> Frame {
        Frame {
            sequence_number: self.sequence_number,
            timestamp_ms: self.timestamp,
            data: self.frame.clone(),
        }
    }
}

// ── base64 payload ───────────────────────────────────────────────

/// Serde adapter carrying `Bytes` as standard base64 text.
pub mod base64_payload {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_frame_metadata() {
        let frame = Frame::new(4, 133, vec![0xFF, 0xD8, 0xFF]);
        let env = FrameEnvelope::new(&frame, ContextId(12));
        assert_eq!(env.sequence_number, 4);
        assert_eq!(env.target_id, ContextId(12));
        assert_eq!(env.to_frame(), frame);
    }

    #[test]
    fn envelope_json_uses_base64_and_camel_case() {
        let frame = Frame::new(1, 20, vec![1, 2, 3]);
        let json = serde_json::to_value(FrameEnvelope::new(&frame, ContextId(3))).unwrap();
        assert_eq!(json["frame"], "AQID");
        assert_eq!(json["targetId"], 3);
        assert_eq!(json["sequenceNumber"], 1);
        assert_eq!(json["timestamp"], 20);
        assert!(json.get("quality").is_none());

        let tagged = FrameEnvelope::new(&frame, ContextId(3)).with_quality(Quality::new(70));
        let json = serde_json::to_value(&tagged).unwrap();
        assert_eq!(json["quality"], 70);
        let back: FrameEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.quality, Some(Quality::new(70)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let raw = r#"{"frame":"@@not base64@@","targetId":1,"sequenceNumber":0,"timestamp":0}"#;
        assert!(serde_json::from_str::<FrameEnvelope>(raw).is_err());
    }
}
