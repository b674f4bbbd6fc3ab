//! Minimal HTTP/1.1 message reader and writer for the upgrade handshake.
//!
//! One generic [`HttpMessage`] serves both directions: the client writes a
//! request and reads a response, the server reads a request and writes a
//! response. Only what the WebSocket handshake needs is implemented.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// An HTTP request or response: a start line plus header fields.
///
/// Duplicate header names fold on parse: the first occurrence sets the
/// field, later occurrences append to it with `", "` per HTTP list
/// semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    /// Request line (`GET /path HTTP/1.1`) or status line
    /// (`HTTP/1.1 101 Switching Protocols`).
    pub start_line: String,
    headers: Vec<(String, String)>,
}

impl HttpMessage {
    /// Create a request message.
    #[must_use]
    pub fn request(method: &str, target: &str) -> Self {
        Self {
            start_line: format!("{method} {target} HTTP/1.1"),
            headers: Vec::new(),
        }
    }

    /// Create a response message.
    #[must_use]
    pub fn response(status: u16, reason: &str) -> Self {
        Self {
            start_line: format!("HTTP/1.1 {status} {reason}"),
            headers: Vec::new(),
        }
    }

    /// Append a header field.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Builder-style [`push_header`](Self::push_header).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    /// Look up a header by case-insensitive name.
    ///
    /// Multiple fields of the same name are joined with `", "`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// All header fields in order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Status code, if the start line is a response line.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        let rest = self.start_line.strip_prefix("HTTP/1.1 ")?;
        rest.split_whitespace().next()?.parse().ok()
    }

    /// Method and target, if the start line is a request line.
    #[must_use]
    pub fn request_target(&self) -> Option<(&str, &str)> {
        let mut parts = self.start_line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        let version = parts.next()?;
        if parts.next().is_some() || !version.starts_with("HTTP/") {
            return None;
        }
        Some((method, target))
    }

    /// Read one HTTP message head from the stream.
    ///
    /// Accumulates bytes until the blank line (two consecutive CRLFs),
    /// bounded by `max_size`. Duplicate headers fold as described on the
    /// type.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeTooLarge`] if the head exceeds `max_size`
    /// - [`Error::InvalidHandshake`] on malformed data
    /// - I/O errors from the transport
    pub async fn read_from<T>(io: &mut T, max_size: usize) -> Result<Self>
    where
        T: AsyncRead + Unpin,
    {
        let mut data: Vec<u8> = Vec::with_capacity(256);
        while !data.ends_with(b"\r\n\r\n") {
            if data.len() >= max_size {
                return Err(Error::HandshakeTooLarge {
                    size: data.len(),
                    max: max_size,
                });
            }
            data.push(io.read_u8().await?);
        }
        Self::parse(&data)
    }

    /// Write the message head to the stream, terminated by a blank line.
    pub async fn write_to<T>(&self, io: &mut T) -> Result<()>
    where
        T: AsyncWrite + Unpin,
    {
        let mut data = String::with_capacity(256);
        data.push_str(&self.start_line);
        data.push_str("\r\n");
        for (name, value) in &self.headers {
            data.push_str(name);
            data.push_str(": ");
            data.push_str(value);
            data.push_str("\r\n");
        }
        data.push_str("\r\n");
        io.write_all(data.as_bytes()).await?;
        Ok(())
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8 in HTTP head".into()))?;
        let mut lines = text.split("\r\n");

        let start_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty HTTP message".into()))?
            .to_string();

        let mut message = Self {
            start_line,
            headers: Vec::new(),
        };
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHandshake(format!("Malformed header: {line}")))?;
            let name = name.trim();
            let value = value.trim();
            match message
                .headers
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => message.headers.push((name.to_string(), value.to_string())),
            }
        }
        Ok(message)
    }
}

impl std::fmt::Display for HttpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(data: &[u8]) -> Result<HttpMessage> {
        let mut io = data;
        HttpMessage::read_from(&mut io, 8192).await
    }

    #[tokio::test]
    async fn test_read_request() {
        let msg = read(b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(msg.start_line, "GET /chat HTTP/1.1");
        assert_eq!(msg.request_target(), Some(("GET", "/chat")));
        assert_eq!(msg.header("host").as_deref(), Some("example.com"));
        assert_eq!(msg.header("UPGRADE").as_deref(), Some("websocket"));
    }

    #[tokio::test]
    async fn test_read_response_status() {
        let msg = read(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(msg.status_code(), Some(101));
        assert_eq!(msg.request_target(), None);
    }

    #[tokio::test]
    async fn test_read_stops_at_blank_line() {
        let data = b"HTTP/1.1 101 X\r\nA: 1\r\n\r\n\x81\x00extra";
        let mut io = &data[..];
        let msg = HttpMessage::read_from(&mut io, 8192).await.unwrap();
        assert_eq!(msg.header("A").as_deref(), Some("1"));
        // Frame bytes after the head stay in the stream.
        assert_eq!(io, b"\x81\x00extra");
    }

    #[tokio::test]
    async fn test_duplicate_headers_fold_with_comma() {
        let msg = read(b"GET / HTTP/1.1\r\nAccept: a\r\naccept: b\r\nAccept: c\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(msg.header("Accept").as_deref(), Some("a, b, c"));
    }

    #[tokio::test]
    async fn test_size_limit_enforced() {
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(300));
        let mut io = &data[..];
        let result = HttpMessage::read_from(&mut io, 128).await;
        assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_truncated_head_is_connection_error() {
        let result = read(b"GET / HTTP/1.1\r\nHost: x\r\n").await;
        assert_eq!(result.unwrap_err(), Error::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let result = read(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n").await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }

    #[tokio::test]
    async fn test_write_roundtrip() {
        let msg = HttpMessage::request("GET", "/chat")
            .with_header("Host", "example.com")
            .with_header("Upgrade", "websocket");
        let mut buf = Vec::new();
        msg.write_to(&mut buf).await.unwrap();
        assert!(buf.ends_with(b"\r\n\r\n"));

        let mut io = &buf[..];
        let parsed = HttpMessage::read_from(&mut io, 8192).await.unwrap();
        assert_eq!(parsed, msg);
    }
}
