//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
///
/// Every variant is a per-message failure: the offending frame is dropped and
/// the connection stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input ended before a field was complete
    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Cursor position where the read started
        offset: usize,
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the input
        available: usize,
    },

    /// Output buffer too small for the field being written
    #[error("buffer overflow: {needed} bytes at offset {offset} exceed capacity {capacity}")]
    BufferOverflow {
        /// Cursor position where the write started
        offset: usize,
        /// Bytes the field required
        needed: usize,
        /// Total buffer capacity
        capacity: usize,
    },

    /// Length prefix was negative
    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    /// Length prefix exceeds the allowed maximum
    #[error("length {len} exceeds limit {max}")]
    LengthTooLarge {
        /// Claimed length
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// First byte of a frame is not a known opcode
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// String field is not valid UTF-16
    #[error("invalid UTF-16 string")]
    InvalidString,
}
