//! Reassembly of fragmented messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles data frames into logical messages.
///
/// At most one message is in progress at a time: the first frame of a
/// message carries the real opcode with `fin` deciding single- versus
/// multi-frame, every following frame until `fin=true` must carry
/// `Continuation`. Control frames never pass through here; the connection
/// delivers them as their own single-frame messages between fragments.
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragment_count: usize,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing the given limits.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            fragment_count: 0,
            limits,
        }
    }

    /// Consume one data frame.
    ///
    /// Returns `Ok(Some(message))` when the frame completes a message
    /// (`fin=true`), `Ok(None)` while more fragments are pending. Control
    /// frames are ignored and leave any in-progress assembly untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] for a continuation with no message in
    ///   progress, or a fresh data opcode while one is in progress
    /// - [`Error::MessageTooLarge`] / [`Error::TooManyFragments`] when
    ///   limits are exceeded
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Continuation frame with no message in progress".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (opcode, None) => self.opcode = Some(opcode),
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "New data frame while a fragmented message is in progress".into(),
                ));
            }
        }

        self.limits
            .check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if frame.fin {
            let payload = self.buffer.split().to_vec();
            let opcode = match self.opcode.take() {
                Some(op) => op,
                None => frame.opcode,
            };
            self.fragment_count = 0;
            Ok(Some(AssembledMessage { opcode, payload }))
        } else {
            Ok(None)
        }
    }

    /// Whether a fragmented message is currently in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Discard any in-progress assembly.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.fragment_count = 0;
    }
}

/// A completed reassembly, not yet interpreted.
pub struct AssembledMessage {
    /// Opcode of the first frame (text or binary).
    pub opcode: OpCode,
    /// Concatenated payload of all fragments.
    pub payload: Vec<u8>,
}

impl AssembledMessage {
    /// Interpret the payload as a [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] if a text payload is not valid UTF-8.
    pub fn into_message(self) -> Result<Message> {
        match self.opcode {
            OpCode::Text => {
                let text = String::from_utf8(self.payload).map_err(|_| Error::InvalidUtf8)?;
                Ok(Message::Text(text))
            }
            OpCode::Binary => Ok(Message::Binary(self.payload)),
            other => Err(Error::ProtocolViolation(format!(
                "Cannot assemble a message from opcode {other}"
            ))),
        }
    }
}
