//! Client state machine.
//!
//! Sans-IO core of the client role. The caller reports transport events and
//! application intents; the client answers with actions. No sockets, no
//! timers, no tasks.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Connect ──> AwaitingPeerKey ──ServerPublicKey──> Established
//!                  │                                   │
//!                  │ Tick past handshake_timeout       │ Disconnect / transport closed
//!                  ↓                                   ↓
//!             Close + Error                       Uninitiated
//! ```
//!
//! A fresh key pair is generated on every `Connect`, so reconnecting never
//! reuses the previous session's keys.

use bytes::Bytes;
use shroud_core::{
    ChannelConfig, ChannelError, Direction, Environment, Handshake, HandshakeState, KeyAccepted,
    SecureChannel,
};
use shroud_crypto::PublicKey;
use shroud_proto::{Channel, Message};

use crate::event::{ClientAction, ClientEvent};

/// Client for a single server connection.
pub struct Client<E: Environment> {
    env: E,
    config: ChannelConfig,
    /// Per-connection key pair and send buffer. `None` while disconnected.
    channel: Option<SecureChannel>,
    handshake: Handshake<E::Instant>,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(env: E, config: ChannelConfig) -> Self {
        Self { env, config, channel: None, handshake: Handshake::new() }
    }

    /// Process an event and return the actions to execute.
    ///
    /// # Errors
    ///
    /// Per-message failures (`Protocol`, `Crypto`, `Decryption`,
    /// `UnexpectedMessage`, `KeyRebind`, `UnresolvedSession`, `NotActive`) are
    /// returned as `Err`. State is unchanged and the connection stays open.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ChannelError> {
        match event {
            ClientEvent::Connect => Ok(self.handle_connect()),
            ClientEvent::DataReceived { channel, frame } => self.handle_data_received(channel, &frame),
            ClientEvent::Disconnected { reason } => Ok(self.handle_transport_closed(&reason)),
            ClientEvent::TransportError { error } => {
                Ok(vec![ClientAction::Error(ChannelError::Transport(error))])
            },
            ClientEvent::Send { channel, payload } => self.handle_send(channel, &payload),
            ClientEvent::Disconnect => Ok(self.handle_disconnect()),
            ClientEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_connect(&mut self) -> Vec<ClientAction> {
        let mut actions = Vec::with_capacity(2);
        if self.channel.is_some() {
            actions.push(log("reconnecting, previous session discarded".to_string()));
        }

        let channel = SecureChannel::generate(&self.env, self.config.clone());
        let public_key = channel.public_key();
        self.channel = Some(channel);
        self.handshake.begin(self.env.now());

        actions.push(log(format!("connecting as {public_key:?}, awaiting server key")));
        actions
    }

    fn handle_data_received(
        &mut self,
        channel: Channel,
        frame: &[u8],
    ) -> Result<Vec<ClientAction>, ChannelError> {
        let secure = self.channel.as_mut().ok_or(ChannelError::NotActive)?;

        match secure.decode(frame)? {
            Message::ServerPublicKey { public_key } => {
                let key = secure.parse_peer_key(&public_key)?;

                match self.handshake.accept_peer_key(key, self.config.rebind_policy)? {
                    KeyAccepted::Established => {
                        let hello = match secure.client_hello() {
                            Ok(frame) => frame,
                            Err(e) => {
                                self.handshake.begin(self.env.now());
                                return Err(e);
                            },
                        };
                        Ok(vec![
                            ClientAction::SendFrame { channel: Channel::RELIABLE, frame: hello },
                            ClientAction::Connected,
                            log(format!("established with server {key:?}")),
                        ])
                    },
                    KeyAccepted::Rebound => Ok(vec![log(format!("server key replaced with {key:?}"))]),
                }
            },

            Message::Data { ciphertext, nonce } => {
                let plaintext = secure.open(self.handshake.peer_key(), &ciphertext, &nonce)?;

                let mut actions = Vec::with_capacity(2);
                if let Some(message) = secure.payload_log(Direction::Inbound, plaintext.len(), frame.len()) {
                    actions.push(log(message));
                }
                actions.push(ClientAction::Deliver { channel, payload: Bytes::from(plaintext) });
                Ok(actions)
            },

            message @ Message::ClientPublicKey { .. } => Err(ChannelError::UnexpectedMessage {
                state: self.handshake.state(),
                opcode: message.opcode(),
            }),
        }
    }

    fn handle_send(&mut self, channel: Channel, payload: &[u8]) -> Result<Vec<ClientAction>, ChannelError> {
        let secure = self.channel.as_mut().ok_or(ChannelError::NotActive)?;
        let frame = secure.seal(&self.env, self.handshake.peer_key(), payload)?;

        let mut actions = Vec::with_capacity(2);
        if let Some(message) = secure.payload_log(Direction::Outbound, payload.len(), frame.len()) {
            actions.push(log(message));
        }
        actions.push(ClientAction::SendFrame { channel, frame });
        Ok(actions)
    }

    fn handle_transport_closed(&mut self, reason: &str) -> Vec<ClientAction> {
        let was_established = self.discard_session();

        let mut actions = Vec::with_capacity(2);
        if was_established {
            actions.push(ClientAction::Disconnected);
        }
        actions.push(log(format!("connection closed: {reason}")));
        actions
    }

    fn handle_disconnect(&mut self) -> Vec<ClientAction> {
        let was_established = self.discard_session();

        let mut actions = vec![ClientAction::Close { reason: "disconnect requested".to_string() }];
        if was_established {
            actions.push(ClientAction::Disconnected);
        }
        actions
    }

    fn handle_tick(&mut self) -> Vec<ClientAction> {
        let Some(elapsed) = self.handshake.check_timeout(self.env.now(), self.config.handshake_timeout)
        else {
            return Vec::new();
        };

        self.discard_session();
        let error = ChannelError::HandshakeTimeout { elapsed };
        vec![
            log(error.to_string()),
            ClientAction::Close { reason: error.to_string() },
            ClientAction::Error(error),
        ]
    }

    /// Drop keys and handshake state. Returns whether the session was
    /// established.
    fn discard_session(&mut self) -> bool {
        let was_established = self.handshake.is_established();
        self.channel = None;
        self.handshake.reset();
        was_established
    }

    /// Handshake state of the current connection.
    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// True once the server's key is stored.
    pub fn is_connected(&self) -> bool {
        self.handshake.is_established()
    }

    /// Stored server key. `None` until established.
    pub fn server_key(&self) -> Option<PublicKey> {
        self.handshake.peer_key().copied()
    }

    /// This connection's public key. `None` while disconnected.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.channel.as_ref().map(SecureChannel::public_key)
    }

    /// Maximum frame size.
    pub fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }

    /// Channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl<E: Environment> std::fmt::Debug for Client<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.handshake.state())
            .field("server_key", &self.handshake.peer_key())
            .finish_non_exhaustive()
    }
}

fn log(message: String) -> ClientAction {
    ClientAction::Log { message }
}
