//! WebSocket protocol core (RFC 6455): frames, masking, handshake,
//! message reassembly.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod mask;
pub mod opcode;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::Frame;
pub use handshake::{Handshake, WS_GUID, compute_accept_key, generate_key};
pub use http::HttpMessage;
pub use mask::apply_mask;
pub use opcode::OpCode;

/// Fill `buf` from the system entropy source.
///
/// Falls back to a clock-derived sequence if the entropy source is
/// unavailable; mask keys and handshake nonces need unpredictability, not
/// cryptographic strength.
pub(crate) fn fill_random(buf: &mut [u8]) {
    if getrandom::getrandom(buf).is_ok() {
        return;
    }
    use std::time::{SystemTime, UNIX_EPOCH};
    let mut seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E37_79B9_7F4A_7C15);
    for byte in buf {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *byte = (seed >> 56) as u8;
    }
}
