//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! Builds and validates the HTTP upgrade request/response pair on top of
//! the generic [`HttpMessage`] reader/writer. The validated artifacts are
//! retained on the connection for its lifetime.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::protocol::fill_random;
use crate::protocol::http::HttpMessage;

/// The GUID appended to the key in the Sec-WebSocket-Accept computation
/// (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a `Sec-WebSocket-Key`.
///
/// The accept value is `base64(SHA-1(key + GUID))`.
///
/// # Example
///
/// ```
/// use wspipe::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    fill_random(&mut nonce);
    BASE64.encode(nonce)
}

/// Build the client upgrade request for `path` against `host`.
///
/// Caller-supplied headers are appended after the required set.
#[must_use]
pub fn build_request(path: &str, host: &str, key: &str, headers: &[(String, String)]) -> HttpMessage {
    let mut request = HttpMessage::request("GET", path)
        .with_header("Host", host)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Key", key)
        .with_header("Sec-WebSocket-Version", "13");
    for (name, value) in headers {
        request.push_header(name, value);
    }
    request
}

/// Build the server 101 response for a validated request key.
#[must_use]
pub fn build_response(accept: &str) -> HttpMessage {
    HttpMessage::response(101, "Switching Protocols")
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", accept)
}

fn check_upgrade_headers(message: &HttpMessage, context: &str) -> Result<()> {
    let upgrade = message
        .header("Upgrade")
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing Upgrade header in {context}")))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }

    let connection = message
        .header("Connection")
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing Connection header in {context}")))?;
    if !connection.to_lowercase().contains("upgrade") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Connection header: {connection}"
        )));
    }
    Ok(())
}

/// Validate a client upgrade request and return its `Sec-WebSocket-Key`.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] if the request line is not a
/// well-formed `GET ... HTTP/1.1`, if `Upgrade`/`Connection` are missing or
/// mismatched, or if `Sec-WebSocket-Key` is absent.
pub fn validate_request(request: &HttpMessage) -> Result<String> {
    let (method, _target) = request.request_target().ok_or_else(|| {
        Error::InvalidHandshake(format!("Invalid request line: {}", request.start_line))
    })?;
    if method != "GET" {
        return Err(Error::InvalidHandshake(format!(
            "Expected GET method, got {method}"
        )));
    }

    check_upgrade_headers(request, "request")?;

    request
        .header("Sec-WebSocket-Key")
        .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))
}

/// Validate a server upgrade response against the key the client sent and
/// return the accepted `Sec-WebSocket-Accept` value.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] if the status is not 101, if
/// `Upgrade`/`Connection` are missing or mismatched, or if
/// `Sec-WebSocket-Accept` does not match `base64(SHA-1(key + GUID))`.
pub fn validate_response(response: &HttpMessage, key: &str) -> Result<String> {
    match response.status_code() {
        Some(101) => {}
        _ => {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {}",
                response.start_line
            )));
        }
    }

    check_upgrade_headers(response, "response")?;

    let accept = response
        .header("Sec-WebSocket-Accept")
        .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
    let expected = compute_accept_key(key);
    if accept != expected {
        return Err(Error::InvalidHandshake(format!(
            "Sec-WebSocket-Accept mismatch: expected {expected}, got {accept}"
        )));
    }
    Ok(accept)
}

/// The completed upgrade exchange, retained read-only on a connection.
///
/// Both roles hold all four pieces: the request/response pair as seen on
/// the wire, the client key and the computed accept value.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// The upgrade request (sent by the client, received by the server).
    pub request: HttpMessage,
    /// The 101 response (received by the client, sent by the server).
    pub response: HttpMessage,
    /// The `Sec-WebSocket-Key` value.
    pub key: String,
    /// The `Sec-WebSocket-Accept` value.
    pub accept: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    #[test]
    fn test_compute_accept_key_rfc_example() {
        // RFC 6455 Section 1.3 example.
        assert_eq!(
            compute_accept_key(SAMPLE_KEY),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_generate_key_is_16_random_bytes() {
        let key = generate_key();
        let decoded = BASE64.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(generate_key(), key);
    }

    #[test]
    fn test_build_request_has_required_headers() {
        let request = build_request("/chat", "server.example.com", SAMPLE_KEY, &[]);
        assert_eq!(request.start_line, "GET /chat HTTP/1.1");
        assert_eq!(request.header("Host").as_deref(), Some("server.example.com"));
        assert_eq!(request.header("Upgrade").as_deref(), Some("websocket"));
        assert_eq!(request.header("Connection").as_deref(), Some("Upgrade"));
        assert_eq!(request.header("Sec-WebSocket-Key").as_deref(), Some(SAMPLE_KEY));
        assert_eq!(request.header("Sec-WebSocket-Version").as_deref(), Some("13"));
    }

    #[test]
    fn test_build_request_appends_caller_headers() {
        let extra = vec![("Authorization".to_string(), "Bearer token".to_string())];
        let request = build_request("/", "host", SAMPLE_KEY, &extra);
        assert_eq!(
            request.header("Authorization").as_deref(),
            Some("Bearer token")
        );
    }

    #[test]
    fn test_validate_request_accepts_wellformed() {
        let request = build_request("/chat", "example.com", SAMPLE_KEY, &[]);
        assert_eq!(validate_request(&request).unwrap(), SAMPLE_KEY);
    }

    #[test]
    fn test_validate_request_rejects_non_get() {
        let mut request = build_request("/", "example.com", SAMPLE_KEY, &[]);
        request.start_line = "POST / HTTP/1.1".into();
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("GET")));
    }

    #[test]
    fn test_validate_request_rejects_missing_key() {
        let request = HttpMessage::request("GET", "/")
            .with_header("Host", "example.com")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade");
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Key")));
    }

    #[test]
    fn test_validate_request_rejects_missing_upgrade() {
        let request = HttpMessage::request("GET", "/")
            .with_header("Host", "example.com")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Key", SAMPLE_KEY);
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("Upgrade")));
    }

    #[test]
    fn test_validate_request_malformed_request_line() {
        let mut request = build_request("/", "example.com", SAMPLE_KEY, &[]);
        request.start_line = "GARBAGE".into();
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn test_validate_response_accepts_matching_accept() {
        let response = build_response(&compute_accept_key(SAMPLE_KEY));
        assert_eq!(
            validate_response(&response, SAMPLE_KEY).unwrap(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_validate_response_rejects_wrong_status() {
        let response = HttpMessage::response(200, "OK")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade");
        let err = validate_response(&response, SAMPLE_KEY).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("101")));
    }

    #[test]
    fn test_validate_response_rejects_accept_mismatch() {
        let response = build_response("bogus-accept-value");
        let err = validate_response(&response, SAMPLE_KEY).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("mismatch")));
    }

    #[test]
    fn test_validate_response_rejects_missing_accept() {
        let response = HttpMessage::response(101, "Switching Protocols")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade");
        let err = validate_response(&response, SAMPLE_KEY).unwrap_err();
        assert!(
            matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Accept"))
        );
    }

    #[test]
    fn test_case_insensitive_header_values() {
        let response = HttpMessage::response(101, "Switching Protocols")
            .with_header("UPGRADE", "WebSocket")
            .with_header("connection", "upgrade")
            .with_header("Sec-WebSocket-Accept", compute_accept_key(SAMPLE_KEY));
        assert!(validate_response(&response, SAMPLE_KEY).is_ok());
    }

    #[test]
    fn test_full_exchange_roundtrip() {
        let key = generate_key();
        let request = build_request("/chat", "example.com", &key, &[]);
        let client_key = validate_request(&request).unwrap();
        let response = build_response(&compute_accept_key(&client_key));
        assert!(validate_response(&response, &key).is_ok());
    }
}
