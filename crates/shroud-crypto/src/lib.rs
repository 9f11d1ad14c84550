//! Shroud Cryptographic Primitives
//!
//! The public-key box used to seal every application payload once two peers
//! have exchanged public keys. Pure functions with deterministic outputs:
//! callers provide the random bytes for private keys and nonces, so the same
//! code runs under the deterministic simulation harness and in production.
//!
//! # Construction
//!
//! ```text
//! local private key ─┐
//!                    ├─ X25519 ─→ shared secret
//! peer public key ───┘                 │
//!                                      ▼
//!                   HKDF-SHA256 (info "shroud box v1") → box key
//!                                      │
//!                                      ▼
//!             XChaCha20-Poly1305 (24-byte nonce) → ciphertext ‖ tag
//! ```
//!
//! Both directions of a connection derive the same box key, so a message
//! sealed with `(a_private, b_public)` opens with `(b_private, a_public)`.
//!
//! # Security
//!
//! - Authenticity: the Poly1305 tag covers the ciphertext under a key bound to
//!   the nonce, so any flipped bit in either fails decryption.
//! - Nonces: 24 random bytes per message; collisions are negligible in the
//!   `XChaCha20` nonce space.
//! - Low-order peer keys produce an all-zero shared secret and are rejected.
//! - Private keys and derived box keys are zeroized on drop.
//! - The exchange is unauthenticated. An active attacker who can rewrite the
//!   first two messages of a connection can sit in the middle.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod keypair;
mod seal;

pub use error::CryptoError;
pub use keypair::{KeyPair, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE, PublicKey};
pub use seal::{NONCE_SIZE, Nonce, TAG_SIZE, decrypt, encrypt};
