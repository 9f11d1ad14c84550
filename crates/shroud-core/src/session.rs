//! Per-connection session store.
//!
//! Maps connection ids to their handshake (and through it, the peer public
//! key). Entries are created awaiting a key when a connection opens and
//! removed synchronously on disconnect, so a reused id always starts from an
//! empty session.

use std::{collections::HashMap, ops::Sub, time::Duration};

use shroud_crypto::PublicKey;

use crate::handshake::{Handshake, HandshakeState};

/// Transport-assigned connection identifier.
pub type ConnectionId = u64;

/// Sessions keyed by connection id.
#[derive(Debug, Clone)]
pub struct SessionStore<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    sessions: HashMap<ConnectionId, Handshake<I>>,
}

impl<I> SessionStore<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: HashMap::new() }
    }

    /// Create a session awaiting the peer key.
    ///
    /// Returns false (and leaves the existing session alone) if `id` is
    /// already open.
    pub fn open(&mut self, id: ConnectionId, now: I) -> bool {
        if self.sessions.contains_key(&id) {
            return false;
        }
        self.sessions.insert(id, Handshake::awaiting(now));
        true
    }

    /// Handshake for `id`.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Handshake<I>> {
        self.sessions.get(&id)
    }

    /// Mutable handshake for `id`.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Handshake<I>> {
        self.sessions.get_mut(&id)
    }

    /// Resolved peer key for `id`. `None` while awaiting or if unknown.
    #[must_use]
    pub fn peer_key(&self, id: ConnectionId) -> Option<&PublicKey> {
        self.sessions.get(&id).and_then(Handshake::peer_key)
    }

    /// Handshake state for `id`. `None` if unknown.
    #[must_use]
    pub fn state(&self, id: ConnectionId) -> Option<HandshakeState> {
        self.sessions.get(&id).map(Handshake::state)
    }

    /// Discard the session for `id`. Returns true if one existed.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Discard every session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Sessions whose handshake deadline has passed, with elapsed time.
    #[must_use]
    pub fn expired(&self, now: I, timeout: Duration) -> Vec<(ConnectionId, Duration)> {
        let mut expired: Vec<_> = self
            .sessions
            .iter()
            .filter_map(|(&id, handshake)| handshake.check_timeout(now, timeout).map(|e| (id, e)))
            .collect();
        // HashMap order is random; keep action order stable
        expired.sort_unstable_by_key(|&(id, _)| id);
        expired
    }

    /// Ids of all open sessions, in no particular order.
    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.sessions.keys().copied()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with a resolved peer key.
    #[must_use]
    pub fn established_count(&self) -> usize {
        self.sessions.values().filter(|h| h.is_established()).count()
    }
}

impl<I> Default for SessionStore<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}
