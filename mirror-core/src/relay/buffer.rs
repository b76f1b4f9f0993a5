//! Single-slot, latest-wins frame buffer.

use crate::frame::FrameEnvelope;

/// Holds at most one pending frame.
///
/// A new frame overwrites any undelivered one. Writers never block and
/// there is no queue depth: this overwrite rule is the relay's only
/// backpressure.
#[derive(Debug, Default)]
pub struct RelayBuffer {
    slot: Option<FrameEnvelope>,
    overwritten: u64,
}

impl RelayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing the pending one.
    ///
    /// Returns the frame that was superseded, if any.
    pub fn put(&mut self, frame: FrameEnvelope) -> Option<FrameEnvelope> {
        let previous = self.slot.replace(frame);
        if previous.is_some() {
            self.overwritten += 1;
        }
        previous
    }

    /// Peek at the pending frame.
    pub fn latest(&self) -> Option<&FrameEnvelope> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Frames that were replaced before anyone read them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.slot = None;
        self.overwritten = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::message::ContextId;

    fn env(seq: u64) -> FrameEnvelope {
        FrameEnvelope::new(&Frame::new(seq, 0, vec![seq as u8]), ContextId(1))
    }

    #[test]
    fn latest_wins() {
        let mut buf = RelayBuffer::new();
        assert!(buf.put(env(5)).is_none());
        let superseded = buf.put(env(6)).unwrap();
        assert_eq!(superseded.sequence_number, 5);

        assert_eq!(buf.latest().unwrap().sequence_number, 6);
        assert_eq!(buf.overwritten(), 1);

        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.overwritten(), 0);
    }

    #[test]
    fn latest_does_not_consume() {
        let mut buf = RelayBuffer::new();
        buf.put(env(1));
        assert_eq!(buf.latest().unwrap().sequence_number, 1);
        assert!(!buf.is_empty());
    }
}
