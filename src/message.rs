//! WebSocket message types as defined in RFC 6455.

use crate::error::{Error, Result};

/// Well-known close status codes per RFC 6455 Section 7.4 that the engine
/// itself sends.
pub mod close_status {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error (malformed frame, masking violation, ...).
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Invalid payload data (non-UTF-8 in a text message).
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Server encountered an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Status code and reason carried by a close message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// The close status code.
    pub status: u16,
    /// Human-readable reason (UTF-8, at most 123 bytes on the wire).
    pub reason: String,
}

impl CloseReason {
    /// Create a new close reason.
    #[must_use]
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// Decode a close frame payload: optional 2-byte big-endian status
    /// followed by a UTF-8 reason.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] for a 1-byte payload
    /// - [`Error::InvalidUtf8`] if the reason is not valid UTF-8
    pub fn decode(payload: &[u8]) -> Result<Option<Self>> {
        match payload.len() {
            0 => Ok(None),
            1 => Err(Error::ProtocolViolation(
                "Close payload of one byte".into(),
            )),
            _ => {
                let status = u16::from_be_bytes([payload[0], payload[1]]);
                let reason = std::str::from_utf8(&payload[2..])?;
                Ok(Some(Self::new(status, reason)))
            }
        }
    }

    /// Encode as a close frame payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = self.status.to_be_bytes().to_vec();
        payload.extend_from_slice(self.reason.as_bytes());
        payload
    }
}

/// A logical WebSocket message, assembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// A text message (valid UTF-8).
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A ping control message (payload at most 125 bytes).
    Ping(Vec<u8>),
    /// A pong control message (payload at most 125 bytes).
    Pong(Vec<u8>),
    /// A close control message with optional status and reason.
    Close(Option<CloseReason>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Create a ping message.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Message::Ping(data.into())
    }

    /// Create a pong message.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Message::Pong(data.into())
    }

    /// Create a close message with status code and reason.
    #[must_use]
    pub fn close(status: u16, reason: impl Into<String>) -> Self {
        Message::Close(Some(CloseReason::new(status, reason)))
    }

    /// Returns `true` if this is a text message.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Returns `true` if this is a close message.
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Returns `true` if this is a data message (text or binary).
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    /// Returns `true` if this is a control message (ping, pong or close).
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Message::Ping(_) | Message::Pong(_) | Message::Close(_)
        )
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the binary content, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Message::Binary(data) => Some(data),
            _ => None,
        }
    }

    /// Consume and return the text content, if this is a text message.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Consume and return the binary content, if this is a binary message.
    #[must_use]
    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Message::Binary(data) => Some(data),
            _ => None,
        }
    }
}
