//! Error types for the secure channel.
//!
//! One enum covers every way a single inbound or outbound message can fail.
//! The state machines return these as `Err` from `process_event` and runtimes
//! log them and keep the connection. Failures that end a connection, such as a
//! handshake timeout, surface as `Error` actions instead; applications that
//! receive both kinds can tell them apart with [`ChannelError::is_recoverable`].

use std::time::Duration;

use shroud_crypto::CryptoError;
use shroud_proto::{Opcode, ProtocolError};
use thiserror::Error;

use crate::{handshake::HandshakeState, session::ConnectionId};

/// Errors raised while processing a message on a secure channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Malformed frame (bad opcode, truncated, oversized field)
    #[error("decode error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication tag did not verify
    #[error("decryption failed")]
    Decryption,

    /// Key or nonce material was unusable (wrong length, weak key)
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// Send or decrypt attempted before the peer key was known
    #[error("no resolved peer key for this session")]
    UnresolvedSession,

    /// Opcode not valid for this role and handshake state
    #[error("unexpected message: {opcode} in state {state:?}")]
    UnexpectedMessage {
        /// Handshake state when the message arrived
        state: HandshakeState,
        /// Opcode of the message
        opcode: Opcode,
    },

    /// Second public key on an established session under `Reject`
    #[error("peer attempted to rebind its public key")]
    KeyRebind,

    /// Peer never completed the key exchange
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// No session for this connection id
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Server stopped or client not connected
    #[error("channel is not active")]
    NotActive,

    /// Error reported by the underlying transport, passed through unchanged
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Returns true if the connection survives this error.
    ///
    /// Per-message failures drop the offending message only. A handshake
    /// timeout ends the connection.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::HandshakeTimeout { .. })
    }
}

impl From<CryptoError> for ChannelError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed => Self::Decryption,
            other => Self::Crypto(other),
        }
    }
}
