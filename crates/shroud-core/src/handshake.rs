//! Key exchange state machine.
//!
//! One instance per connection. Pure: time is passed in, nothing is sent from
//! here. The caller turns transitions into frames and application events.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────┐  begin   ┌─────────────────┐  peer key   ┌─────────────┐
//! │ Uninitiated │─────────>│ AwaitingPeerKey │────────────>│ Established │
//! └─────────────┘          └─────────────────┘             └─────────────┘
//!                                  │                          │   ^
//!                                  │ handshake_timeout        │   │ peer key
//!                                  ↓                          └───┘ (policy)
//!                              discarded
//! ```

use std::{ops::Sub, time::Duration};

use shroud_crypto::PublicKey;

use crate::{config::KeyRebindPolicy, error::ChannelError};

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Role not activated for this connection yet
    Uninitiated,
    /// Own key sent or expected, peer key not received
    AwaitingPeerKey,
    /// Peer key stored, data may flow
    Established,
}

/// Result of accepting a peer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAccepted {
    /// First key: the session just became established
    Established,
    /// Established session's key replaced under `KeyRebindPolicy::Replace`
    Rebound,
}

/// Handshake for a single connection.
///
/// Generic over `Instant` so the simulation harness can use virtual time.
#[derive(Debug, Clone)]
pub struct Handshake<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    state: HandshakeState,
    started_at: Option<I>,
    peer_key: Option<PublicKey>,
}

impl<I> Handshake<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a handshake in [`HandshakeState::Uninitiated`].
    #[must_use]
    pub fn new() -> Self {
        Self { state: HandshakeState::Uninitiated, started_at: None, peer_key: None }
    }

    /// Create a handshake already waiting for the peer's key.
    #[must_use]
    pub fn awaiting(now: I) -> Self {
        let mut handshake = Self::new();
        handshake.begin(now);
        handshake
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Peer key, once established.
    #[must_use]
    pub fn peer_key(&self) -> Option<&PublicKey> {
        self.peer_key.as_ref()
    }

    /// True once the peer key is known.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// Start waiting for the peer's key. Restarts the deadline.
    pub fn begin(&mut self, now: I) {
        self.state = HandshakeState::AwaitingPeerKey;
        self.started_at = Some(now);
        self.peer_key = None;
    }

    /// Store the peer's key.
    ///
    /// # Errors
    ///
    /// - `ChannelError::UnresolvedSession` if the handshake never began
    /// - `ChannelError::KeyRebind` if already established under
    ///   `KeyRebindPolicy::Reject`; the stored key is unchanged
    pub fn accept_peer_key(
        &mut self,
        key: PublicKey,
        policy: KeyRebindPolicy,
    ) -> Result<KeyAccepted, ChannelError> {
        match (self.state, policy) {
            (HandshakeState::Uninitiated, _) => Err(ChannelError::UnresolvedSession),
            (HandshakeState::AwaitingPeerKey, _) => {
                self.state = HandshakeState::Established;
                self.peer_key = Some(key);
                Ok(KeyAccepted::Established)
            },
            (HandshakeState::Established, KeyRebindPolicy::Reject) => Err(ChannelError::KeyRebind),
            (HandshakeState::Established, KeyRebindPolicy::Replace) => {
                self.peer_key = Some(key);
                Ok(KeyAccepted::Rebound)
            },
        }
    }

    /// Elapsed time if the handshake deadline has passed. `None` otherwise,
    /// and always `None` outside `AwaitingPeerKey`.
    #[must_use]
    pub fn check_timeout(&self, now: I, timeout: Duration) -> Option<Duration> {
        if self.state != HandshakeState::AwaitingPeerKey {
            return None;
        }

        let started_at = self.started_at?;
        let elapsed = now - started_at;
        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Forget the peer key and return to `Uninitiated`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<I> Default for Handshake<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use shroud_crypto::KeyPair;

    use super::*;

    fn key(seed: u8) -> PublicKey {
        KeyPair::from_private_bytes([seed; 32]).public_key()
    }

    #[test]
    fn lifecycle() {
        let t0 = Instant::now();
        let mut handshake = Handshake::new();
        assert_eq!(handshake.state(), HandshakeState::Uninitiated);

        handshake.begin(t0);
        assert_eq!(handshake.state(), HandshakeState::AwaitingPeerKey);
        assert!(handshake.peer_key().is_none());

        let accepted = handshake.accept_peer_key(key(1), KeyRebindPolicy::Reject).unwrap();
        assert_eq!(accepted, KeyAccepted::Established);
        assert_eq!(handshake.peer_key(), Some(&key(1)));

        handshake.reset();
        assert_eq!(handshake.state(), HandshakeState::Uninitiated);
        assert!(handshake.peer_key().is_none());
    }

    #[test]
    fn key_before_begin_is_unresolved() {
        let mut handshake = Handshake::<Instant>::new();
        let result = handshake.accept_peer_key(key(1), KeyRebindPolicy::Replace);
        assert_eq!(result, Err(ChannelError::UnresolvedSession));
    }

    #[test]
    fn reject_policy_keeps_first_key() {
        let mut handshake = Handshake::awaiting(Instant::now());
        handshake.accept_peer_key(key(1), KeyRebindPolicy::Reject).unwrap();

        let result = handshake.accept_peer_key(key(2), KeyRebindPolicy::Reject);
        assert_eq!(result, Err(ChannelError::KeyRebind));
        assert_eq!(handshake.peer_key(), Some(&key(1)));
    }

    #[test]
    fn replace_policy_overwrites_key() {
        let mut handshake = Handshake::awaiting(Instant::now());
        handshake.accept_peer_key(key(1), KeyRebindPolicy::Replace).unwrap();

        let result = handshake.accept_peer_key(key(2), KeyRebindPolicy::Replace);
        assert_eq!(result, Ok(KeyAccepted::Rebound));
        assert_eq!(handshake.peer_key(), Some(&key(2)));
    }

    #[test]
    fn timeout_only_while_awaiting() {
        let t0 = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut handshake = Handshake::awaiting(t0);

        assert_eq!(handshake.check_timeout(t0 + Duration::from_secs(10), timeout), None);
        assert_eq!(
            handshake.check_timeout(t0 + Duration::from_secs(11), timeout),
            Some(Duration::from_secs(11))
        );

        handshake.accept_peer_key(key(1), KeyRebindPolicy::Reject).unwrap();
        assert_eq!(handshake.check_timeout(t0 + Duration::from_secs(60), timeout), None);
    }
}
