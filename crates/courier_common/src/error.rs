//! Error types for the courier link.

use thiserror::Error;

use crate::wire::RESPONSE_HEADER_LEN;

/// A received frame could not be interpreted.
///
/// Treated as "no usable response" by the link, not as a fatal condition on
/// its own; the caller decides whether the exchange is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: {len} bytes, need at least {RESPONSE_HEADER_LEN}")]
    Truncated { len: usize },

    #[error("unknown opcode 0x{value:02X}")]
    UnknownOpcode { value: u8 },

    #[error("malformed opcode prefix {prefix:?}")]
    BadPrefix { prefix: String },
}

/// A command exchange on the link failed before a terminal response arrived.
///
/// A peer-reported ERROR status is *not* a `LinkError`; the link hands that
/// response back as an ordinary value and the caller inspects its detail.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("command write failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("no usable response: {0}")]
    NoResponse(String),
}
