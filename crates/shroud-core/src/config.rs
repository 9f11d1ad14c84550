//! Channel configuration.

use std::time::Duration;

/// Time a peer has to answer with its public key.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum frame size (16 KiB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024;

/// What to do when a peer sends a second public key on an established
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRebindPolicy {
    /// Keep the stored key and report `KeyRebind`
    #[default]
    Reject,
    /// Overwrite the stored key. No new "connected" event is raised.
    Replace,
}

/// Configuration shared by both roles of a secure channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Deadline for leaving `AwaitingPeerKey`
    pub handshake_timeout: Duration,
    /// Send buffer capacity and cap on every decoded field
    pub max_packet_size: usize,
    /// Handling of a second public key
    pub rebind_policy: KeyRebindPolicy,
    /// Emit a debug log per message with raw and decrypted sizes
    pub log_payloads: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            rebind_policy: KeyRebindPolicy::default(),
            log_payloads: false,
        }
    }
}
