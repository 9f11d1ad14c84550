//! Crypto error types.

use thiserror::Error;

/// Errors from the public-key box.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer key is a low-order point; the shared secret would be all zeroes
    #[error("peer public key is weak (non-contributory key agreement)")]
    WeakPublicKey,

    /// Public key has the wrong length
    #[error("invalid public key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Nonce has the wrong length
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Authentication tag did not verify (tampering or wrong key)
    #[error("decryption failed: authentication failed")]
    DecryptionFailed,
}
