//! Frame-level encoding and decoding over an async byte stream.
//!
//! Decoding is streaming: the codec requests exactly the bytes each field
//! dictates (the fixed 2-byte header, then the extended length, then the
//! mask key, then the payload), never a fixed oversized read. This keeps
//! the stream positioned on a frame boundary at all times.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::MAX_CONTROL_PAYLOAD;
use crate::protocol::{Frame, OpCode, apply_mask, fill_random};

/// Encodes and decodes single frames on a transport stream.
///
/// The role fixes the mask direction: a client masks every outgoing frame
/// with a fresh random key and accepts unmasked input; a server never masks
/// and rejects unmasked input.
pub struct FrameCodec<T> {
    io: T,
    role: Role,
    limits: Limits,
}

impl<T> FrameCodec<T> {
    /// Create a codec over `io` for the given role.
    #[must_use]
    pub fn new(io: T, role: Role, limits: Limits) -> Self {
        Self { io, role, limits }
    }

    /// The connection role driving mask direction.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Shared access to the underlying stream.
    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Mutable access to the underlying stream (used for the handshake,
    /// which runs before frame traffic).
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }
}

impl<T: AsyncRead + Unpin> FrameCodec<T> {
    /// Read one frame from the stream, unmasking the payload in place.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOpcode`] for any opcode outside the six assigned
    /// - [`Error::ReservedBitsSet`] if RSV bits are set
    /// - [`Error::FragmentedControlFrame`] / [`Error::ControlFrameTooLarge`]
    ///   for control-frame invariant violations
    /// - [`Error::UnmaskedFrame`] if a server receives an unmasked frame
    /// - [`Error::FrameTooLarge`] before the payload is allocated
    /// - [`Error::ConnectionClosed`] on end-of-stream
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; 2];
        self.io.read_exact(&mut header).await?;

        let fin = header[0] & 0x80 != 0;
        if header[0] & 0x70 != 0 {
            return Err(Error::ReservedBitsSet);
        }
        let opcode = OpCode::from_u8(header[0] & 0x0F)?;
        let masked = header[1] & 0x80 != 0;

        let payload_len = match header[1] & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                self.io.read_exact(&mut ext).await?;
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                self.io.read_exact(&mut ext).await?;
                usize::try_from(u64::from_be_bytes(ext)).unwrap_or(usize::MAX)
            }
            short => short as usize,
        };

        if opcode.is_control() {
            if !fin {
                return Err(Error::FragmentedControlFrame);
            }
            if payload_len > MAX_CONTROL_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(payload_len));
            }
        }
        self.limits.check_frame_size(payload_len)?;

        if self.role.requires_masked_input() && !masked {
            return Err(Error::UnmaskedFrame);
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            self.io.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len];
        self.io.read_exact(&mut payload).await?;
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Frame::new(fin, opcode, payload))
    }
}

impl<T: AsyncWrite + Unpin> FrameCodec<T> {
    /// Write one frame, masking per role.
    ///
    /// # Errors
    ///
    /// Propagates control-frame validation failures and transport errors.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        frame.validate()?;
        let mask = if self.role.masks_outgoing() {
            let mut key = [0u8; 4];
            fill_random(&mut key);
            Some(key)
        } else {
            None
        };
        let mut buf = Vec::with_capacity(frame.wire_size(mask.is_some()));
        frame.encode_into(&mut buf, mask);
        self.io.write_all(&buf).await?;
        Ok(())
    }

    /// Flush buffered writes to the transport.
    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8], role: Role) -> FrameCodec<&[u8]> {
        FrameCodec::new(data, role, Limits::default())
    }

    #[tokio::test]
    async fn test_read_unmasked_text_frame() {
        let mut codec = reader(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f], Role::Client);
        let frame = codec.read_frame().await.unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[tokio::test]
    async fn test_read_masked_text_frame() {
        let data = [
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // masked "Hello"
        ];
        let mut codec = reader(&data, Role::Server);
        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.payload(), b"Hello");
    }

    #[tokio::test]
    async fn test_read_extended_length_16bit() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00];
        data.extend(vec![0xab; 256]);
        let mut codec = reader(&data, Role::Client);
        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload().len(), 256);
        assert!(frame.payload().iter().all(|&b| b == 0xab));
    }

    #[tokio::test]
    async fn test_read_extended_length_64bit() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);
        let mut codec = reader(&data, Role::Client);
        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.payload().len(), 65536);
    }

    #[tokio::test]
    async fn test_reserved_opcode_is_protocol_error() {
        let mut codec = reader(&[0x8f, 0x00], Role::Client);
        let err = codec.read_frame().await.unwrap_err();
        assert_eq!(err, Error::InvalidOpcode(0x0F));
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_rsv_bits_rejected() {
        let mut codec = reader(&[0xc1, 0x00], Role::Client);
        assert_eq!(codec.read_frame().await.unwrap_err(), Error::ReservedBitsSet);
    }

    #[tokio::test]
    async fn test_fragmented_control_frame_rejected() {
        // Ping with FIN=0.
        let mut codec = reader(&[0x09, 0x00], Role::Client);
        assert_eq!(
            codec.read_frame().await.unwrap_err(),
            Error::FragmentedControlFrame
        );
    }

    #[tokio::test]
    async fn test_oversized_control_frame_rejected_before_payload() {
        // Ping claiming 200 payload bytes; none are provided.
        let mut codec = reader(&[0x89, 0x7e, 0x00, 0xc8], Role::Client);
        assert_eq!(
            codec.read_frame().await.unwrap_err(),
            Error::ControlFrameTooLarge(200)
        );
    }

    #[tokio::test]
    async fn test_server_rejects_unmasked_frame() {
        let mut codec = reader(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f], Role::Server);
        assert_eq!(codec.read_frame().await.unwrap_err(), Error::UnmaskedFrame);
    }

    #[tokio::test]
    async fn test_client_accepts_masked_frame() {
        // Unusual per RFC but tolerated by the client role.
        let data = [0x81, 0x81, 0x01, 0x02, 0x03, 0x04, b'a' ^ 0x01];
        let mut codec = reader(&data, Role::Client);
        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.payload(), b"a");
    }

    #[tokio::test]
    async fn test_frame_size_limit_checked_before_allocation() {
        let mut data = vec![0x82, 0x7f];
        data.extend(u64::MAX.to_be_bytes());
        let mut codec = FrameCodec::new(&data[..], Role::Client, Limits::default());
        assert!(matches!(
            codec.read_frame().await.unwrap_err(),
            Error::FrameTooLarge { .. }
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        let mut codec = reader(&[0x81, 0x05, 0x48, 0x65], Role::Client);
        assert_eq!(
            codec.read_frame().await.unwrap_err(),
            Error::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_eof_at_frame_boundary_is_connection_closed() {
        let mut codec = reader(&[], Role::Client);
        assert_eq!(
            codec.read_frame().await.unwrap_err(),
            Error::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_server_writes_unmasked() {
        let mut codec = FrameCodec::new(Vec::new(), Role::Server, Limits::default());
        codec.write_frame(&Frame::text("Hi")).await.unwrap();
        assert_eq!(codec.get_ref(), &[0x81, 0x02, b'H', b'i']);
    }

    #[tokio::test]
    async fn test_client_writes_masked_with_random_key() {
        let mut codec = FrameCodec::new(Vec::new(), Role::Client, Limits::default());
        codec.write_frame(&Frame::text("Hi")).await.unwrap();
        let buf = codec.get_ref().clone();
        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 0x82); // mask bit + len=2
        let key = [buf[2], buf[3], buf[4], buf[5]];
        let mut payload = buf[6..].to_vec();
        apply_mask(&mut payload, key);
        assert_eq!(payload, b"Hi");
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_control_frame() {
        let mut codec = FrameCodec::new(Vec::new(), Role::Server, Limits::default());
        let err = codec
            .write_frame(&Frame::ping(vec![0u8; 126]))
            .await
            .unwrap_err();
        assert_eq!(err, Error::ControlFrameTooLarge(126));
        assert!(codec.get_ref().is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_client_to_server() {
        let mut writer = FrameCodec::new(Vec::new(), Role::Client, Limits::default());
        let original = Frame::binary(vec![1, 2, 3, 4, 5]);
        writer.write_frame(&original).await.unwrap();

        let wire = writer.get_ref().clone();
        let mut codec = FrameCodec::new(&wire[..], Role::Server, Limits::default());
        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame, original);
    }
}
