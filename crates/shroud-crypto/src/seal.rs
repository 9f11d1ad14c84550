//! Public-key box encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure: nonces must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{CryptoError, KeyPair, PublicKey};

/// Size of a box nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// HKDF info binding derived keys to this construction
const BOX_KEY_INFO: &[u8] = b"shroud box v1";

/// A 24-byte `XChaCha20` nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Wrap raw nonce bytes (from the environment's CSPRNG).
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a nonce received from the network.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidNonceLength` unless `bytes` is exactly 24 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let nonce: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidNonceLength { expected: NONCE_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(nonce))
    }

    /// Raw nonce bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// Seal `plaintext` for `peer`.
///
/// Returns ciphertext with the 16-byte tag appended.
///
/// # Errors
///
/// - `CryptoError::WeakPublicKey` if `peer` is a low-order point
///
/// # Security
///
/// - Caller MUST provide a fresh random nonce per message
/// - The box key is derived per call and zeroized before returning
pub fn encrypt(
    plaintext: &[u8],
    nonce: &Nonce,
    local: &KeyPair,
    peer: &PublicKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = box_cipher(local, peer)?;

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce.0), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    Ok(ciphertext)
}

/// Open a box sealed by `peer` for `local`.
///
/// # Errors
///
/// - `CryptoError::WeakPublicKey` if `peer` is a low-order point
/// - `CryptoError::DecryptionFailed` if the tag does not verify (tampered
///   ciphertext or nonce, or the wrong key pair)
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &Nonce,
    local: &KeyPair,
    peer: &PublicKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = box_cipher(local, peer)?;

    cipher
        .decrypt(XNonce::from_slice(&nonce.0), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Derive the symmetric cipher shared by `local` and `peer`.
fn box_cipher(local: &KeyPair, peer: &PublicKey) -> Result<XChaCha20Poly1305, CryptoError> {
    let shared = local.secret().diffie_hellman(&peer.to_dalek());
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    let Ok(()) = hkdf.expand(BOX_KEY_INFO, &mut key[..]) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    Ok(XChaCha20Poly1305::new((&*key).into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(seed: u8) -> KeyPair {
        KeyPair::from_private_bytes([seed; 32])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let alice = pair(1);
        let bob = pair(2);
        let nonce = Nonce::from_bytes([0xAB; NONCE_SIZE]);

        let ciphertext = encrypt(b"ping", &nonce, &alice, &bob.public_key()).unwrap();
        let plaintext = decrypt(&ciphertext, &nonce, &bob, &alice.public_key()).unwrap();

        assert_eq!(plaintext, b"ping");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let nonce = Nonce::from_bytes([0; NONCE_SIZE]);
        let ciphertext = encrypt(b"test message", &nonce, &pair(1), &pair(2).public_key()).unwrap();

        assert_eq!(ciphertext.len(), 12 + TAG_SIZE);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let alice = pair(3);
        let bob = pair(4);
        let nonce = Nonce::from_bytes([0x11; NONCE_SIZE]);

        let ciphertext = encrypt(b"", &nonce, &alice, &bob.public_key()).unwrap();
        assert_eq!(decrypt(&ciphertext, &nonce, &bob, &alice.public_key()).unwrap(), b"");
    }

    #[test]
    fn wrong_recipient_fails() {
        let alice = pair(1);
        let bob = pair(2);
        let eve = pair(3);
        let nonce = Nonce::from_bytes([0x01; NONCE_SIZE]);

        let ciphertext = encrypt(b"secret", &nonce, &alice, &bob.public_key()).unwrap();
        let result = decrypt(&ciphertext, &nonce, &eve, &alice.public_key());

        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_nonce_fails() {
        let alice = pair(1);
        let bob = pair(2);
        let nonce = Nonce::from_bytes([0x01; NONCE_SIZE]);

        let ciphertext = encrypt(b"secret", &nonce, &alice, &bob.public_key()).unwrap();
        let mut bad = *nonce.as_bytes();
        bad[23] ^= 0x80;

        let result = decrypt(&ciphertext, &Nonce::from_bytes(bad), &bob, &alice.public_key());
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn low_order_peer_key_rejected() {
        // The identity point; every scalar multiple is zero
        let weak = PublicKey::from_bytes([0; 32]);
        let nonce = Nonce::from_bytes([0; NONCE_SIZE]);

        assert_eq!(encrypt(b"x", &nonce, &pair(1), &weak), Err(CryptoError::WeakPublicKey));
        assert_eq!(decrypt(&[0; 17], &nonce, &pair(1), &weak), Err(CryptoError::WeakPublicKey));
    }

    #[test]
    fn nonce_length_checked() {
        assert_eq!(
            Nonce::from_slice(&[0; 12]),
            Err(CryptoError::InvalidNonceLength { expected: 24, actual: 12 })
        );
    }
}
