//! Fixed-capacity encode buffer.

use bytes::Bytes;

use crate::{
    Message,
    errors::{ProtocolError, Result},
};

/// Reusable buffer that outbound messages are encoded into.
///
/// Allocated once with the transport's maximum packet size and never resized.
/// A message that does not fit is a `BufferOverflow` error; it is never
/// truncated.
#[derive(Debug)]
pub struct SendBuffer {
    buf: Box<[u8]>,
}

impl SendBuffer {
    /// Allocate a buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0u8; capacity].into_boxed_slice() }
    }

    /// Fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Encode `message` and return a copy of the encoded frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::BufferOverflow` if the encoded message exceeds the
    ///   capacity
    pub fn encode(&mut self, message: &Message) -> Result<Bytes> {
        let needed = message.encoded_len();
        if needed > self.buf.len() {
            return Err(ProtocolError::BufferOverflow {
                offset: 0,
                needed,
                capacity: self.buf.len(),
            });
        }

        let len = message.encode_into(&mut self.buf)?;
        Ok(Bytes::copy_from_slice(&self.buf[..len]))
    }
}
