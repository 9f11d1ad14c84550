//! Shroud wire protocol.
//!
//! Everything that touches raw bytes lives here: the primitive field codec, the
//! opcode table, the three protocol messages, the fixed-capacity send buffer,
//! the stream packet header used by byte-stream transports and, with the
//! `stream` feature, async packet I/O on top of it.
//!
//! # Wire Format
//!
//! ```text
//! [opcode: u8] [field]...
//!
//! field (bytes)  = [length: i32 LE] [length raw bytes]
//!
//! 0 ServerPublicKey  bytes public_key
//! 1 ClientPublicKey  bytes public_key
//! 2 Data             bytes ciphertext, bytes nonce
//! ```
//!
//! # Security
//!
//! Decoding never trusts a length prefix: every variable-length field is
//! checked against a caller-supplied maximum (the transport's packet size)
//! before any allocation happens. Truncated or oversized input is an error
//! value, never a panic.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
pub mod codec;
mod errors;
mod message;
mod opcode;
pub mod packet;
mod send_buffer;
#[cfg(feature = "stream")]
pub mod stream;

pub use channel::Channel;
pub use errors::{ProtocolError, Result};
pub use message::Message;
pub use opcode::Opcode;
pub use packet::PacketHeader;
pub use send_buffer::SendBuffer;
#[cfg(feature = "stream")]
pub use stream::{StreamError, read_packet, write_packet};
