//! X25519 key pairs.

use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::CryptoError;

/// Size of a public key on the wire (32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the random input for a private key (32 bytes)
pub const PRIVATE_KEY_SIZE: usize = 32;

/// A peer's X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key received from the network.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKeyLength` unless `bytes` is exactly 32 bytes
    ///
    /// Any 32-byte value is accepted here. Low-order points are caught by
    /// [`KeyPair::check_peer`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: PUBLIC_KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub(crate) fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 4 bytes are enough to tell keys apart in logs
        write!(f, "PublicKey({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A local key pair.
///
/// The private half never leaves this struct and is zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 random bytes.
    ///
    /// Callers pass bytes from a CSPRNG (the environment's `random_bytes`).
    /// The input array is zeroized after use.
    #[must_use]
    pub fn from_private_bytes(mut bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();

        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Public half, safe to send to the peer.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Check that agreeing with `peer` yields a usable shared secret.
    ///
    /// # Errors
    ///
    /// - `CryptoError::WeakPublicKey` if `peer` is a low-order point; every
    ///   box with it would fail
    pub fn check_peer(&self, peer: &PublicKey) -> Result<(), CryptoError> {
        if self.secret.diffie_hellman(&peer.to_dalek()).was_contributory() {
            Ok(())
        } else {
            Err(CryptoError::WeakPublicKey)
        }
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_public_key() {
        let a = KeyPair::from_private_bytes([7; 32]);
        let b = KeyPair::from_private_bytes([7; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn different_seed_different_public_key() {
        let a = KeyPair::from_private_bytes([1; 32]);
        let b = KeyPair::from_private_bytes([2; 32]);
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_length_checked() {
        assert_eq!(
            PublicKey::from_slice(&[0; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        );
        assert!(PublicKey::from_slice(&[0; 32]).is_ok());
    }

    #[test]
    fn check_peer_rejects_low_order_points() {
        let pair = KeyPair::from_private_bytes([3; 32]);

        assert_eq!(pair.check_peer(&PublicKey::from_bytes([0; 32])), Err(CryptoError::WeakPublicKey));
        // u = 1 has order 4 on Curve25519
        let mut one = [0; 32];
        one[0] = 1;
        assert_eq!(pair.check_peer(&PublicKey::from_bytes(one)), Err(CryptoError::WeakPublicKey));

        let peer = KeyPair::from_private_bytes([4; 32]).public_key();
        assert_eq!(pair.check_peer(&peer), Ok(()));
    }

    #[test]
    fn debug_hides_private_key() {
        let pair = KeyPair::from_private_bytes([0x5A; 32]);
        let rendered = format!("{pair:?}");

        assert!(rendered.starts_with("KeyPair { public: PublicKey("));
        assert!(!rendered.contains("5a5a5a5a5a"));
    }
}
