//! Protocol messages.

use crate::{
    Opcode,
    codec::{self, INT_SIZE},
    errors::{ProtocolError, Result},
};

/// A decoded protocol message.
///
/// # Invariants
///
/// - Each variant maps to exactly one [`Opcode`].
/// - `Data` fields are written ciphertext first, nonce second.
///
/// # Security
///
/// Decoding validates structure only. Public keys are not checked for length
/// or validity here and ciphertexts are not authenticated; both happen in the
/// crypto layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Server's public key, sent as soon as a connection is accepted
    ServerPublicKey {
        /// Raw public key bytes
        public_key: Vec<u8>,
    },

    /// Client's public key, sent in reply to [`Message::ServerPublicKey`]
    ClientPublicKey {
        /// Raw public key bytes
        public_key: Vec<u8>,
    },

    /// Encrypted application payload
    Data {
        /// Box ciphertext including the authentication tag
        ciphertext: Vec<u8>,
        /// Nonce the ciphertext was sealed with
        nonce: Vec<u8>,
    },
}

impl Message {
    /// Opcode identifying this message on the wire.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::ServerPublicKey { .. } => Opcode::ServerPublicKey,
            Self::ClientPublicKey { .. } => Opcode::ClientPublicKey,
            Self::Data { .. } => Opcode::Data,
        }
    }

    /// Exact number of bytes [`Message::encode_into`] writes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Self::ServerPublicKey { public_key } | Self::ClientPublicKey { public_key } => {
                INT_SIZE + public_key.len()
            },
            Self::Data { ciphertext, nonce } => {
                INT_SIZE + ciphertext.len() + INT_SIZE + nonce.len()
            },
        }
    }

    /// Encode into `buf` starting at offset 0. Returns the encoded length.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::BufferOverflow` if the message does not fit. The
    ///   buffer contents are unspecified in that case, but nothing is written
    ///   past its end.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.encoded_len();
        if needed > buf.len() {
            return Err(ProtocolError::BufferOverflow { offset: 0, needed, capacity: buf.len() });
        }

        let mut pos = 0;
        codec::write_byte(buf, &mut pos, self.opcode().to_u8())?;

        match self {
            Self::ServerPublicKey { public_key } | Self::ClientPublicKey { public_key } => {
                codec::write_bytes(buf, &mut pos, public_key)?;
            },
            Self::Data { ciphertext, nonce } => {
                codec::write_bytes(buf, &mut pos, ciphertext)?;
                codec::write_bytes(buf, &mut pos, nonce)?;
            },
        }

        debug_assert_eq!(pos, needed);
        Ok(pos)
    }

    /// Encode into a freshly allocated vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_len()];
        let len = self.encode_into(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Decode a message from a complete frame.
    ///
    /// `max_field_len` caps every length-prefixed field; callers pass the
    /// transport's maximum packet size. Trailing bytes after the last field are
    /// ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` for an empty or short frame
    /// - `ProtocolError::UnknownOpcode` if the first byte is not an opcode
    /// - `ProtocolError::LengthTooLarge` / `NegativeLength` for hostile length
    ///   prefixes
    pub fn decode(bytes: &[u8], max_field_len: usize) -> Result<Self> {
        let mut pos = 0;
        let raw_opcode = codec::read_byte(bytes, &mut pos)?;
        let opcode = Opcode::from_u8(raw_opcode).ok_or(ProtocolError::UnknownOpcode(raw_opcode))?;

        let message = match opcode {
            Opcode::ServerPublicKey => Self::ServerPublicKey {
                public_key: codec::read_bytes(bytes, &mut pos, max_field_len)?,
            },
            Opcode::ClientPublicKey => Self::ClientPublicKey {
                public_key: codec::read_bytes(bytes, &mut pos, max_field_len)?,
            },
            Opcode::Data => {
                let ciphertext = codec::read_bytes(bytes, &mut pos, max_field_len)?;
                let nonce = codec::read_bytes(bytes, &mut pos, max_field_len)?;
                Self::Data { ciphertext, nonce }
            },
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_writes_ciphertext_before_nonce() {
        let message = Message::Data { ciphertext: vec![0xC1, 0xC2], nonce: vec![0x11] };
        let wire = message.to_vec().unwrap();

        assert_eq!(wire, vec![2, 2, 0, 0, 0, 0xC1, 0xC2, 1, 0, 0, 0, 0x11]);
        assert_eq!(wire.len(), message.encoded_len());
    }

    #[test]
    fn encode_into_rejects_small_buffer() {
        let message = Message::ClientPublicKey { public_key: vec![7; 32] };
        let mut buf = [0u8; 16];

        let result = message.encode_into(&mut buf);
        assert_eq!(result, Err(ProtocolError::BufferOverflow { offset: 0, needed: 37, capacity: 16 }));
    }

    #[test]
    fn empty_frame_is_truncated() {
        assert!(matches!(Message::decode(&[], 64), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Message::decode(&[0x09, 0, 0, 0, 0], 64), Err(ProtocolError::UnknownOpcode(9)));
    }

    #[test]
    fn data_missing_nonce_is_truncated() {
        let wire = [2, 1, 0, 0, 0, 0xAA];
        assert!(matches!(Message::decode(&wire, 64), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn field_cap_applies_to_public_keys() {
        let message = Message::ServerPublicKey { public_key: vec![1; 65] };
        let wire = message.to_vec().unwrap();

        assert_eq!(
            Message::decode(&wire, 64),
            Err(ProtocolError::LengthTooLarge { len: 65, max: 64 })
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut wire = Message::ClientPublicKey { public_key: vec![5; 4] }.to_vec().unwrap();
        wire.extend_from_slice(&[0xFF, 0xFF]);

        let decoded = Message::decode(&wire, 64).unwrap();
        assert_eq!(decoded, Message::ClientPublicKey { public_key: vec![5; 4] });
    }
}
