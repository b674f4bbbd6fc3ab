//! Splitting outgoing data messages into frames.

use crate::protocol::{Frame, OpCode};

/// Iterator producing the frame sequence for one outgoing data message.
///
/// Every frame carries exactly `fragment_size` payload bytes except the
/// last. The first frame carries the message opcode, the rest carry
/// `Continuation`; only the last sets `fin`.
pub struct MessageFragmenter<'a> {
    remaining: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Create a fragmenter over `payload`.
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            remaining: payload,
            opcode,
            // A zero fragment size would never make progress.
            fragment_size: fragment_size.max(1),
            started: false,
        }
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() && self.started {
            return None;
        }

        let take = self.remaining.len().min(self.fragment_size);
        let (chunk, rest) = self.remaining.split_at(take);
        self.remaining = rest;

        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.started = true;
            self.opcode
        };

        Some(Frame::new(rest.is_empty(), opcode, chunk.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_message_single_frame() {
        let frames: Vec<_> = MessageFragmenter::new(b"Hello", OpCode::Text, 1024).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert_eq!(frames[0].payload(), b"Hello");
    }

    #[test]
    fn test_exact_chunks_of_fragment_size() {
        let payload = vec![0xAB; 30];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 10).collect();
        assert_eq!(frames.len(), 3);

        assert!(!frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert!(!frames[1].fin);
        assert_eq!(frames[1].opcode, OpCode::Continuation);
        assert!(frames[2].fin);
        assert_eq!(frames[2].opcode, OpCode::Continuation);
        for frame in &frames {
            assert_eq!(frame.payload().len(), 10);
        }
    }

    #[test]
    fn test_last_frame_carries_remainder() {
        let payload = vec![0xCD; 25];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 10).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload().len(), 10);
        assert_eq!(frames[1].payload().len(), 10);
        assert_eq!(frames[2].payload().len(), 5);
    }

    #[test]
    fn test_payload_equal_to_fragment_size() {
        let payload = vec![0xEF; 100];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 100).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
    }

    #[test]
    fn test_empty_payload_yields_one_empty_frame() {
        let frames: Vec<_> = MessageFragmenter::new(b"", OpCode::Text, 16).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert!(frames[0].payload().is_empty());
    }

    #[test]
    fn test_concatenation_restores_payload() {
        let payload: Vec<u8> = (0..=255).collect();
        let mut rebuilt = Vec::new();
        for frame in MessageFragmenter::new(&payload, OpCode::Binary, 7) {
            rebuilt.extend_from_slice(frame.payload());
        }
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn test_zero_fragment_size_clamped() {
        let frames: Vec<_> = MessageFragmenter::new(b"ab", OpCode::Text, 0).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), b"a");
        assert_eq!(frames[1].payload(), b"b");
    }
}
