//! Transport channel identifiers.

use std::fmt;

/// Channel id on the underlying transport.
///
/// The secure layer never interprets channels; it passes the id through so the
/// application sees the same channel the sender used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Channel(pub u8);

impl Channel {
    /// Reliable, ordered delivery. Handshake messages always use this channel.
    pub const RELIABLE: Self = Self(0);

    /// Best-effort delivery.
    pub const UNRELIABLE: Self = Self(1);

    /// Raw channel id.
    #[must_use]
    pub fn id(self) -> u8 {
        self.0
    }
}

impl From<u8> for Channel {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
