//! Decoded packet values and the SSH wire primitives the bridge needs.
//!
//! A [`Packet`] is the ephemeral unit of dispatch: the message type byte, the
//! engine's receive sequence number, and the remaining payload exactly as the
//! engine decrypted it. Redirected packets are re-sent with that payload
//! untouched; the codec helpers below are only used where the bridge must
//! look inside a payload (username capture, exec request parsing) or build
//! one of its own (the synthesised auth failure).

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BridgeError, BridgeResult};

/// One decoded SSH packet as delivered by the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// SSH message type code (see [`crate::msg`]).
    pub msg_type: u8,
    /// Receive sequence number on the connection the packet arrived on.
    pub seq: u32,
    /// Payload bytes following the message type, still undecoded.
    pub payload: Bytes,
}

impl Packet {
    pub fn new(msg_type: u8, seq: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            seq,
            payload: payload.into(),
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads can carry credentials; log shape only.
        f.debug_struct("Packet")
            .field("msg_type", &self.msg_type)
            .field("seq", &self.seq)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Read a length-prefixed byte string (RFC 4251 `string`).
pub fn get_string(buf: &mut Bytes) -> BridgeResult<Bytes> {
    if buf.remaining() < 4 {
        return Err(BridgeError::protocol("truncated string length"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(BridgeError::protocol(format!(
            "truncated string field: {len} bytes declared, {} available",
            buf.remaining()
        )));
    }
    Ok(buf.split_to(len))
}

/// Read a length-prefixed UTF-8 string; the length prefix is exact, no
/// truncation or expansion.
pub fn get_utf8(buf: &mut Bytes) -> BridgeResult<String> {
    let raw = get_string(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| BridgeError::protocol("string field is not valid UTF-8"))
}

/// Read an RFC 4251 `boolean`.
pub fn get_bool(buf: &mut Bytes) -> BridgeResult<bool> {
    if !buf.has_remaining() {
        return Err(BridgeError::protocol("truncated boolean field"));
    }
    Ok(buf.get_u8() != 0)
}

/// Read an RFC 4251 `uint32`.
pub fn get_u32(buf: &mut Bytes) -> BridgeResult<u32> {
    if buf.remaining() < 4 {
        return Err(BridgeError::protocol("truncated uint32 field"));
    }
    Ok(buf.get_u32())
}

pub fn put_string(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Decode the username from a `SSH_MSG_USERAUTH_REQUEST` payload. The
/// username is the first field; the rest of the request is left untouched so
/// the original packet can be replayed unmodified.
pub fn auth_username(payload: &Bytes) -> BridgeResult<String> {
    let mut buf = payload.clone();
    get_utf8(&mut buf)
}

/// Build the `SSH_MSG_USERAUTH_FAILURE` payload sent to the client when the
/// destination leg cannot be established: the `publickey` name-list and a
/// cleared partial-success flag.
pub fn auth_failure_payload() -> Bytes {
    let mut buf = BytesMut::new();
    put_string(&mut buf, b"publickey");
    put_bool(&mut buf, false);
    buf.freeze()
}
