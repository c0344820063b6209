//! SSH message type codes handled by the bridge.
//!
//! Numbering per RFC 4250 section 4.1.2 and RFC 4254. Only the types that
//! appear in the classification tables (plus the auth reply the bridge
//! synthesises on destination failure) are defined here; anything else
//! reaching the bridge is a protocol error by design.

// https://tools.ietf.org/html/rfc4253#section-12
pub const DISCONNECT: u8 = 1;
pub const SERVICE_REQUEST: u8 = 5;
pub const KEXINIT: u8 = 20;
pub const NEWKEYS: u8 = 21;

// https://tools.ietf.org/html/rfc4252#section-6
pub const USERAUTH_REQUEST: u8 = 50;
pub const USERAUTH_FAILURE: u8 = 51;

// https://tools.ietf.org/html/rfc4254#section-9
pub const GLOBAL_REQUEST: u8 = 80;
pub const CHANNEL_OPEN: u8 = 90;
pub const CHANNEL_OPEN_CONFIRMATION: u8 = 91;
pub const CHANNEL_WINDOW_ADJUST: u8 = 93;
pub const CHANNEL_DATA: u8 = 94;
pub const CHANNEL_EXTENDED_DATA: u8 = 95;
pub const CHANNEL_EOF: u8 = 96;
pub const CHANNEL_CLOSE: u8 = 97;
pub const CHANNEL_REQUEST: u8 = 98;
pub const CHANNEL_SUCCESS: u8 = 99;
