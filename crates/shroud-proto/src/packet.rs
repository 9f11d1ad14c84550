//! Stream packet framing.
//!
//! Byte-stream transports (TCP) carry each protocol frame behind a fixed 5-byte
//! header so the reader knows where one message ends and which channel it was
//! sent on.
//!
//! ```text
//! [length: u32 BE] [channel: u8] [length bytes of frame]
//! ```

use bytes::BufMut;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Channel,
    errors::{ProtocolError, Result},
};

/// Size of the serialized packet header.
pub const PACKET_HEADER_SIZE: usize = 5;

/// Fixed 5-byte packet header (Big Endian length).
///
/// Fields are raw byte arrays so every 5-byte pattern is a valid header and the
/// struct can be read straight from network bytes.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    length: [u8; 4],
    channel: u8,
}

impl PacketHeader {
    /// Size of the serialized header
    pub const SIZE: usize = PACKET_HEADER_SIZE;

    /// Header for a frame of `length` bytes on `channel`.
    #[must_use]
    pub fn new(length: u32, channel: Channel) -> Self {
        Self { length: length.to_be_bytes(), channel: channel.id() }
    }

    /// Parse a header from the first 5 bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if fewer than 5 bytes are available
    /// - `ProtocolError::LengthTooLarge` if the announced frame exceeds
    ///   `max_len`
    ///
    /// # Security
    ///
    /// The length is validated here, before the caller allocates a buffer for
    /// the frame body.
    pub fn from_bytes(bytes: &[u8], max_len: usize) -> Result<Self> {
        let (header, _) = Self::read_from_prefix(bytes).map_err(|_| ProtocolError::Truncated {
            offset: 0,
            needed: Self::SIZE,
            available: bytes.len(),
        })?;

        let len = header.length() as usize;
        if len > max_len {
            return Err(ProtocolError::LengthTooLarge { len, max: max_len });
        }

        Ok(header)
    }

    /// Serialize to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(self.as_bytes());
        arr
    }

    /// Length of the frame that follows.
    #[must_use]
    pub fn length(&self) -> u32 {
        u32::from_be_bytes(self.length)
    }

    /// Channel the frame was sent on.
    #[must_use]
    pub fn channel(&self) -> Channel {
        Channel(self.channel)
    }
}

impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("length", &self.length())
            .field("channel", &self.channel())
            .finish()
    }
}

/// Write header and frame to `dst`.
///
/// # Errors
///
/// - `ProtocolError::LengthTooLarge` if `frame` exceeds `max_len`; nothing is
///   written in that case.
pub fn encode_packet(
    channel: Channel,
    frame: &[u8],
    dst: &mut impl BufMut,
    max_len: usize,
) -> Result<()> {
    if frame.len() > max_len {
        return Err(ProtocolError::LengthTooLarge { len: frame.len(), max: max_len });
    }
    let length = u32::try_from(frame.len())
        .map_err(|_| ProtocolError::LengthTooLarge { len: frame.len(), max: u32::MAX as usize })?;

    dst.put_slice(&PacketHeader::new(length, channel).to_bytes());
    dst.put_slice(frame);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let header = PacketHeader::new(0x0102_0304, Channel::UNRELIABLE);
        assert_eq!(header.to_bytes(), [0x01, 0x02, 0x03, 0x04, 0x01]);
    }

    #[test]
    fn parse_reads_prefix_only() {
        let bytes = [0, 0, 0, 3, 0, 0xAA, 0xBB, 0xCC];
        let header = PacketHeader::from_bytes(&bytes, 16).unwrap();

        assert_eq!(header.length(), 3);
        assert_eq!(header.channel(), Channel::RELIABLE);
    }

    #[test]
    fn short_header_is_truncated() {
        let result = PacketHeader::from_bytes(&[0, 0, 1], 16);
        assert_eq!(result, Err(ProtocolError::Truncated { offset: 0, needed: 5, available: 3 }));
    }

    #[test]
    fn oversized_length_rejected() {
        let bytes = PacketHeader::new(17, Channel::RELIABLE).to_bytes();
        let result = PacketHeader::from_bytes(&bytes, 16);
        assert_eq!(result, Err(ProtocolError::LengthTooLarge { len: 17, max: 16 }));
    }

    #[test]
    fn encode_packet_prepends_header() {
        let mut out = Vec::new();
        encode_packet(Channel(7), b"hi", &mut out, 16).unwrap();
        assert_eq!(out, vec![0, 0, 0, 2, 7, b'h', b'i']);
    }

    #[test]
    fn encode_packet_rejects_oversized_frame() {
        let mut out = Vec::new();
        let result = encode_packet(Channel::RELIABLE, &[0u8; 32], &mut out, 16);

        assert!(result.is_err());
        assert!(out.is_empty());
    }
}
