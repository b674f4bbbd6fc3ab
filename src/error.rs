//! Error types for the WebSocket protocol engine.
//!
//! Every failure the engine can surface is a variant of [`Error`]. Variants
//! group into four kinds ([`ErrorKind`]) so callers can decide between retry
//! and abort without matching on individual variants: protocol violations and
//! connection failures are fatal, handshake failures abort the upgrade, and
//! timeouts are retryable.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Frame carried an opcode outside the six values RFC 6455 defines.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved bits set although no extension was negotiated.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Control frame received with FIN=0.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload exceeds the 125-byte limit.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Server received a frame without the mandatory client mask.
    #[error("Masking required")]
    UnmaskedFrame,

    /// Fragmentation-rule violation detected by the assembler.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// Frame size exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message size exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Malformed or rejected HTTP upgrade exchange.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake data exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Actual handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// No data arrived within the configured timeout. Retryable.
    #[error("Connection operation timeout")]
    Timeout,

    /// The transport reached end-of-stream or was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O failure on the underlying transport.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Coarse classification of an [`Error`], mirroring the four failure
/// categories of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed frame, bad opcode, fragmentation or masking violation.
    /// Fatal: the connection sends a close frame and disconnects.
    Protocol,
    /// Malformed or rejected upgrade exchange. Fatal to the connect/accept.
    Handshake,
    /// Configured timeout elapsed with no data. The caller may retry.
    Timeout,
    /// Transport end-of-stream or I/O failure. Fatal.
    Connection,
}

impl Error {
    /// Classify this error into one of the four [`ErrorKind`] categories.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidOpcode(_)
            | Error::ReservedBitsSet
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::UnmaskedFrame
            | Error::ProtocolViolation(_)
            | Error::InvalidUtf8
            | Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. } => ErrorKind::Protocol,
            Error::InvalidHandshake(_) | Error::HandshakeTooLarge { .. } => ErrorKind::Handshake,
            Error::Timeout => ErrorKind::Timeout,
            Error::ConnectionClosed | Error::Io(_) => ErrorKind::Connection,
        }
    }

    /// Whether this error terminates the connection.
    ///
    /// Only timeouts leave the connection usable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Timeout)
    }

    /// Close status and reason to send to the peer before disconnecting.
    ///
    /// Only protocol-kind errors carry one; other kinds disconnect without a
    /// close frame of their own.
    #[must_use]
    pub fn close_status(&self) -> Option<(u16, &'static str)> {
        match self {
            Error::UnmaskedFrame => Some((1002, "Masking required")),
            Error::InvalidUtf8 => Some((1007, "Invalid UTF-8")),
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. } => Some((1009, "Message too big")),
            Error::InvalidOpcode(_)
            | Error::ReservedBitsSet
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::ProtocolViolation(_) => Some((1002, "Protocol error")),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
