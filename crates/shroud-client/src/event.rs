//! Client events and actions.

use bytes::Bytes;
use shroud_core::ChannelError;
use shroud_proto::Channel;

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle (connected, data, closed, errors)
/// - Driving time forward via ticks
/// - Forwarding application intents (send, disconnect)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport connected to the server.
    ///
    /// Generates a fresh key pair for this connection and starts waiting for
    /// the server's public key. The application is not told "connected" yet.
    Connect,

    /// Frame received from the server.
    DataReceived {
        /// Channel the frame arrived on.
        channel: Channel,
        /// Raw frame bytes.
        frame: Bytes,
    },

    /// Transport closed the connection.
    Disconnected {
        /// Reason for closure.
        reason: String,
    },

    /// Transport reported an error.
    TransportError {
        /// Error text as reported by the transport.
        error: String,
    },

    /// Application wants to send a payload.
    Send {
        /// Channel to send on.
        channel: Channel,
        /// Plaintext payload.
        payload: Bytes,
    },

    /// Application wants to close the connection.
    Disconnect,

    /// Time tick for handshake timeout processing.
    Tick,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Write a frame to the server.
    SendFrame {
        /// Channel to send on.
        channel: Channel,
        /// Encoded frame.
        frame: Bytes,
    },

    /// Close the transport connection.
    Close {
        /// Reason for closing.
        reason: String,
    },

    /// Key exchange finished; surface "connected" to the application.
    Connected,

    /// Deliver decrypted payload to the application.
    Deliver {
        /// Channel the payload arrived on.
        channel: Channel,
        /// Plaintext.
        payload: Bytes,
    },

    /// Established connection went away.
    Disconnected,

    /// Transport error or handshake timeout for the application.
    Error(ChannelError),

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
