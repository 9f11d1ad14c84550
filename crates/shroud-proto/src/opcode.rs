//! Opcode table.

use std::fmt;

/// Leading byte of every frame, identifying the payload layout.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Server announces its public key (server → client, on accept)
    ServerPublicKey = 0,
    /// Client answers with its public key (client → server)
    ClientPublicKey = 1,
    /// Encrypted application payload (both directions, once established)
    Data = 2,
}

impl Opcode {
    /// Parse an opcode byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ServerPublicKey),
            1 => Some(Self::ClientPublicKey),
            2 => Some(Self::Data),
            _ => None,
        }
    }

    /// Wire value of this opcode.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ServerPublicKey => "ServerPublicKey",
            Self::ClientPublicKey => "ClientPublicKey",
            Self::Data => "Data",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(Opcode::ServerPublicKey.to_u8(), 0);
        assert_eq!(Opcode::ClientPublicKey.to_u8(), 1);
        assert_eq!(Opcode::Data.to_u8(), 2);
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        for value in 3..=u8::MAX {
            assert_eq!(Opcode::from_u8(value), None);
        }
    }

    #[test]
    fn from_u8_inverts_to_u8() {
        for opcode in [Opcode::ServerPublicKey, Opcode::ClientPublicKey, Opcode::Data] {
            assert_eq!(Opcode::from_u8(opcode.to_u8()), Some(opcode));
        }
    }
}
