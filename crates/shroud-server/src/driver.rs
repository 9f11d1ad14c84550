//! Server driver.
//!
//! Ties together the session store (one handshake per connection), the shared
//! secure channel (server key pair and send buffer) and the application-facing
//! events. Pure: the runtime feeds [`ServerEvent`]s in and executes the
//! returned [`ServerAction`]s.

use bytes::Bytes;
use shroud_core::{
    ChannelConfig, ChannelError, ConnectionId, Direction, Environment, HandshakeState,
    KeyAccepted, SecureChannel, SessionStore,
};
use shroud_crypto::PublicKey;
use shroud_proto::{Channel, Message};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Secure channel configuration (timeouts, packet size, rebind policy)
    pub channel: ChannelConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { channel: ChannelConfig::default(), max_connections: 1024 }
    }
}

/// Events that the server driver processes.
///
/// Transport events come from the runtime; `Send` and `Disconnect` come from
/// the application.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Transport accepted a connection
    ConnectionOpened {
        /// Connection ID assigned by the runtime
        conn_id: ConnectionId,
    },

    /// Transport delivered a frame
    DataReceived {
        /// Originating connection
        conn_id: ConnectionId,
        /// Channel the frame arrived on
        channel: Channel,
        /// Raw frame bytes
        frame: Bytes,
    },

    /// Transport reports the connection closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        conn_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Transport reports an error on a connection
    TransportError {
        /// Affected connection
        conn_id: ConnectionId,
        /// Error text as reported by the transport
        error: String,
    },

    /// Application wants to send a payload
    Send {
        /// Target connection
        conn_id: ConnectionId,
        /// Channel to send on
        channel: Channel,
        /// Plaintext payload
        payload: Bytes,
    },

    /// Application wants to close a connection
    Disconnect {
        /// Connection to close
        conn_id: ConnectionId,
    },

    /// Periodic tick for handshake timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Write a frame to the transport
    SendFrame {
        /// Target connection
        conn_id: ConnectionId,
        /// Channel to send on
        channel: Channel,
        /// Encoded frame
        frame: Bytes,
    },

    /// Ask the transport to close a connection
    CloseConnection {
        /// Connection to close
        conn_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Key exchange finished; surface "connected" to the application
    Connected {
        /// Established connection
        conn_id: ConnectionId,
    },

    /// Decrypted payload for the application
    Deliver {
        /// Originating connection
        conn_id: ConnectionId,
        /// Channel the payload arrived on
        channel: Channel,
        /// Plaintext
        payload: Bytes,
    },

    /// An established connection went away
    Disconnected {
        /// Connection that went away
        conn_id: ConnectionId,
    },

    /// Connection-level error for the application
    Error {
        /// Affected connection
        conn_id: ConnectionId,
        /// What went wrong
        error: ChannelError,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Inactive until [`ServerDriver::start`] generates the server key pair; that
/// key pair is shared by every connection until [`ServerDriver::stop`].
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Key pair and send buffer. `None` while stopped.
    channel: Option<SecureChannel>,
    /// Handshake per connection
    sessions: SessionStore<E::Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a stopped server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { channel: None, sessions: SessionStore::new(), env, config }
    }

    /// Generate the server key pair and start accepting connections.
    ///
    /// Restarting an active driver keeps its key pair.
    pub fn start(&mut self) -> Vec<ServerAction> {
        if self.channel.is_some() {
            return vec![log(LogLevel::Warn, "server already started".to_string())];
        }

        let channel = SecureChannel::generate(&self.env, self.config.channel.clone());
        let message = format!("server started with public key {:?}", channel.public_key());
        self.channel = Some(channel);

        vec![log(LogLevel::Info, message)]
    }

    /// Drop the key pair and every session.
    ///
    /// Returns a `CloseConnection` for each open connection.
    pub fn stop(&mut self) -> Vec<ServerAction> {
        if self.channel.take().is_none() {
            return Vec::new();
        }

        let mut conn_ids: Vec<ConnectionId> = self.sessions.connection_ids().collect();
        conn_ids.sort_unstable();
        self.sessions.clear();

        let mut actions: Vec<ServerAction> = conn_ids
            .into_iter()
            .map(|conn_id| ServerAction::CloseConnection {
                conn_id,
                reason: "server stopped".to_string(),
            })
            .collect();
        actions.push(log(LogLevel::Info, "server stopped".to_string()));
        actions
    }

    /// Process a server event and return actions to execute.
    ///
    /// # Errors
    ///
    /// Per-message failures (`Protocol`, `Decryption`, `UnresolvedSession`,
    /// `UnexpectedMessage`, `KeyRebind`, `UnknownConnection`) are returned as
    /// `Err`. No state was mutated and the connection stays open; the runtime
    /// logs and continues.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ChannelError> {
        match event {
            ServerEvent::ConnectionOpened { conn_id } => self.handle_connection_opened(conn_id),
            ServerEvent::DataReceived { conn_id, channel, frame } => {
                self.handle_data_received(conn_id, channel, &frame)
            },
            ServerEvent::ConnectionClosed { conn_id, reason } => {
                Ok(self.handle_connection_closed(conn_id, &reason))
            },
            ServerEvent::TransportError { conn_id, error } => {
                Ok(vec![ServerAction::Error { conn_id, error: ChannelError::Transport(error) }])
            },
            ServerEvent::Send { conn_id, channel, payload } => {
                self.handle_send(conn_id, channel, &payload)
            },
            ServerEvent::Disconnect { conn_id } => Ok(self.handle_disconnect(conn_id)),
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_opened(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<Vec<ServerAction>, ChannelError> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(vec![ServerAction::CloseConnection {
                conn_id,
                reason: "server not active".to_string(),
            }]);
        };

        if self.sessions.len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    conn_id,
                    reason: "max connections exceeded".to_string(),
                },
                log(LogLevel::Warn, format!("connection {conn_id} rejected: at capacity")),
            ]);
        }

        if !self.sessions.open(conn_id, self.env.now()) {
            return Ok(vec![log(
                LogLevel::Warn,
                format!("connection {conn_id} opened twice, keeping existing session"),
            )]);
        }

        let hello = match channel.server_hello() {
            Ok(frame) => frame,
            Err(e) => {
                self.sessions.remove(conn_id);
                return Err(e);
            },
        };

        Ok(vec![
            ServerAction::SendFrame { conn_id, channel: Channel::RELIABLE, frame: hello },
            log(LogLevel::Debug, format!("connection {conn_id} opened, sent server public key")),
        ])
    }

    /// Handle a frame received from a connection.
    fn handle_data_received(
        &mut self,
        conn_id: ConnectionId,
        channel: Channel,
        frame: &[u8],
    ) -> Result<Vec<ServerAction>, ChannelError> {
        let secure = self.channel.as_ref().ok_or(ChannelError::NotActive)?;
        let state = self.sessions.state(conn_id).ok_or(ChannelError::UnknownConnection(conn_id))?;

        match secure.decode(frame)? {
            Message::ClientPublicKey { public_key } => {
                let key = secure.parse_peer_key(&public_key)?;
                let policy = secure.config().rebind_policy;
                let handshake = self
                    .sessions
                    .get_mut(conn_id)
                    .ok_or(ChannelError::UnknownConnection(conn_id))?;

                match handshake.accept_peer_key(key, policy)? {
                    KeyAccepted::Established => Ok(vec![
                        ServerAction::Connected { conn_id },
                        log(LogLevel::Info, format!("connection {conn_id} established")),
                    ]),
                    KeyAccepted::Rebound => Ok(vec![log(
                        LogLevel::Warn,
                        format!("connection {conn_id} replaced its public key"),
                    )]),
                }
            },

            Message::Data { ciphertext, nonce } => {
                let plaintext = secure.open(self.sessions.peer_key(conn_id), &ciphertext, &nonce)?;

                let mut actions = Vec::with_capacity(2);
                if let Some(message) = secure.payload_log(Direction::Inbound, plaintext.len(), frame.len()) {
                    actions.push(log(LogLevel::Debug, format!("connection {conn_id}: {message}")));
                }
                actions.push(ServerAction::Deliver { conn_id, channel, payload: Bytes::from(plaintext) });
                Ok(actions)
            },

            message @ Message::ServerPublicKey { .. } => {
                Err(ChannelError::UnexpectedMessage { state, opcode: message.opcode() })
            },
        }
    }

    /// Handle the transport closing a connection.
    fn handle_connection_closed(&mut self, conn_id: ConnectionId, reason: &str) -> Vec<ServerAction> {
        let was_established = self.sessions.state(conn_id) == Some(HandshakeState::Established);

        if !self.sessions.remove(conn_id) {
            return vec![log(LogLevel::Debug, format!("connection {conn_id} closed: {reason}"))];
        }

        let mut actions = Vec::with_capacity(2);
        if was_established {
            actions.push(ServerAction::Disconnected { conn_id });
        }
        actions.push(log(LogLevel::Info, format!("connection {conn_id} closed: {reason}")));
        actions
    }

    /// Seal an application payload for a connection.
    fn handle_send(
        &mut self,
        conn_id: ConnectionId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<Vec<ServerAction>, ChannelError> {
        let secure = self.channel.as_mut().ok_or(ChannelError::NotActive)?;
        let handshake = self.sessions.get(conn_id).ok_or(ChannelError::UnknownConnection(conn_id))?;

        let frame = secure.seal(&self.env, handshake.peer_key(), payload)?;

        let mut actions = Vec::with_capacity(2);
        if let Some(message) = secure.payload_log(Direction::Outbound, payload.len(), frame.len()) {
            actions.push(log(LogLevel::Debug, format!("connection {conn_id}: {message}")));
        }
        actions.push(ServerAction::SendFrame { conn_id, channel, frame });
        Ok(actions)
    }

    /// Close a connection on the application's request.
    ///
    /// The session is discarded before returning; the transport's later close
    /// notification finds nothing left to clean up.
    fn handle_disconnect(&mut self, conn_id: ConnectionId) -> Vec<ServerAction> {
        let was_established = self.sessions.state(conn_id) == Some(HandshakeState::Established);
        let existed = self.sessions.remove(conn_id);

        let mut actions = vec![ServerAction::CloseConnection {
            conn_id,
            reason: "disconnect requested".to_string(),
        }];
        if was_established {
            actions.push(ServerAction::Disconnected { conn_id });
        }
        if !existed {
            actions.push(log(LogLevel::Debug, format!("disconnect for unknown connection {conn_id}")));
        }
        actions
    }

    /// Close connections whose handshake deadline passed.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for (conn_id, elapsed) in self.sessions.expired(now, self.config.channel.handshake_timeout) {
            self.sessions.remove(conn_id);

            let error = ChannelError::HandshakeTimeout { elapsed };
            actions.push(log(LogLevel::Warn, format!("connection {conn_id}: {error}")));
            actions.push(ServerAction::CloseConnection { conn_id, reason: error.to_string() });
            actions.push(ServerAction::Error { conn_id, error });
        }

        actions
    }

    /// True between `start` and `stop`.
    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    /// Server public key. `None` while stopped.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.channel.as_ref().map(SecureChannel::public_key)
    }

    /// Number of open connections (any handshake state).
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of connections that completed the key exchange.
    pub fn established_count(&self) -> usize {
        self.sessions.established_count()
    }

    /// Handshake state of a connection. `None` if unknown.
    pub fn handshake_state(&self, conn_id: ConnectionId) -> Option<HandshakeState> {
        self.sessions.state(conn_id)
    }

    /// Stored client key for a connection. `None` until established.
    pub fn peer_key(&self, conn_id: ConnectionId) -> Option<PublicKey> {
        self.sessions.peer_key(conn_id).copied()
    }

    /// Maximum frame size.
    pub fn max_packet_size(&self) -> usize {
        self.config.channel.max_packet_size
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("active", &self.is_active())
            .field("connection_count", &self.sessions.len())
            .field("established_count", &self.sessions.established_count())
            .finish()
    }
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}
