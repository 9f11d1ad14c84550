//! In-memory network between one server and many clients.
//!
//! Every frame and every close travels through a single FIFO queue of
//! [`Delivery`] values. Nothing moves until the test calls [`SimNetwork::step`]
//! or [`SimNetwork::run`], so a test can inspect or rewrite traffic at any
//! point.
//!
//! # Close Semantics
//!
//! Closing behaves like a TCP shutdown: frames already queued from the closing
//! side still arrive, then the peer observes the close. Frames produced after
//! a close towards a closed connection are dropped.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::Bytes;
use shroud_client::{Client, ClientAction, ClientEvent};
use shroud_core::{ChannelConfig, ChannelError, ConnectionId};
use shroud_proto::Channel;
use shroud_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};

use crate::SimEnv;

/// Which side of a connection a delivery is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Endpoint {
    /// The server, for the given connection
    Server(ConnectionId),
    /// The client owning the given connection
    Client(ConnectionId),
}

impl Endpoint {
    /// Connection this endpoint belongs to.
    pub fn conn_id(self) -> ConnectionId {
        match self {
            Self::Server(conn_id) | Self::Client(conn_id) => conn_id,
        }
    }
}

/// Item in flight between endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A protocol frame
    Frame {
        /// Receiving endpoint
        to: Endpoint,
        /// Channel the frame was sent on
        channel: Channel,
        /// Raw frame bytes
        frame: Bytes,
    },
    /// The sending side closed the connection
    Close {
        /// Endpoint that observes the close
        to: Endpoint,
        /// Close reason
        reason: String,
    },
}

impl Delivery {
    /// Receiving endpoint.
    pub fn to(&self) -> Endpoint {
        match self {
            Self::Frame { to, .. } | Self::Close { to, .. } => *to,
        }
    }
}

/// An event an endpoint refused with a per-message error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Endpoint that refused
    pub at: Endpoint,
    /// Why
    pub error: ChannelError,
}

/// Simulated server plus clients.
pub struct SimNetwork {
    env: SimEnv,
    server: ServerDriver<SimEnv>,
    client_config: ChannelConfig,
    clients: BTreeMap<ConnectionId, Client<SimEnv>>,
    /// Connections with both directions open
    open: BTreeSet<ConnectionId>,
    queue: VecDeque<Delivery>,
    server_log: Vec<ServerAction>,
    client_logs: BTreeMap<ConnectionId, Vec<ClientAction>>,
    rejections: Vec<Rejection>,
    next_conn_id: ConnectionId,
}

impl SimNetwork {
    /// Start a server seeded with `seed`. Clients use `client_config`.
    pub fn new(seed: u64, server_config: DriverConfig, client_config: ChannelConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let mut server = ServerDriver::new(env.clone(), server_config);
        let start_actions = server.start();

        let mut network = Self {
            env,
            server,
            client_config,
            clients: BTreeMap::new(),
            open: BTreeSet::new(),
            queue: VecDeque::new(),
            server_log: Vec::new(),
            client_logs: BTreeMap::new(),
            rejections: Vec::new(),
            next_conn_id: 1,
        };
        network.apply_server_actions(start_actions);
        network
    }

    /// Start with default configuration on both sides.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(seed, DriverConfig::default(), ChannelConfig::default())
    }

    /// Connect a new client under the next free sequential id.
    pub fn connect(&mut self) -> ConnectionId {
        while self.clients.contains_key(&self.next_conn_id) {
            self.next_conn_id += 1;
        }
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        self.connect_as(conn_id);
        conn_id
    }

    /// Connect a client under a chosen id, replacing any previous client with
    /// that id. Models a transport that reuses connection ids.
    pub fn connect_as(&mut self, conn_id: ConnectionId) {
        tracing::trace!(conn_id, "sim connect");
        self.open.insert(conn_id);

        let mut client = Client::new(self.env.clone(), self.client_config.clone());
        let result = client.handle(ClientEvent::Connect);
        self.clients.insert(conn_id, client);
        self.client_logs.entry(conn_id).or_default();
        self.apply_client_result(conn_id, result);

        let result = self.server.process_event(ServerEvent::ConnectionOpened { conn_id });
        self.apply_server_result(conn_id, result);
    }

    /// Application on `conn_id`'s client sends a payload.
    pub fn client_send(
        &mut self,
        conn_id: ConnectionId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), ChannelError> {
        let client = self.clients.get_mut(&conn_id).ok_or(ChannelError::UnknownConnection(conn_id))?;
        let actions = client.handle(ClientEvent::Send { channel, payload: Bytes::copy_from_slice(payload) })?;
        self.apply_client_actions(conn_id, actions);
        Ok(())
    }

    /// Server application sends a payload to `conn_id`.
    pub fn server_send(
        &mut self,
        conn_id: ConnectionId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), ChannelError> {
        let actions = self.server.process_event(ServerEvent::Send {
            conn_id,
            channel,
            payload: Bytes::copy_from_slice(payload),
        })?;
        self.apply_server_actions(actions);
        Ok(())
    }

    /// Client application closes its connection.
    pub fn client_disconnect(&mut self, conn_id: ConnectionId) {
        let Some(client) = self.clients.get_mut(&conn_id) else {
            return;
        };
        let result = client.handle(ClientEvent::Disconnect);
        self.apply_client_result(conn_id, result);
    }

    /// Server application closes a connection.
    pub fn server_disconnect(&mut self, conn_id: ConnectionId) {
        let result = self.server.process_event(ServerEvent::Disconnect { conn_id });
        self.apply_server_result(conn_id, result);
    }

    /// Stop the server, closing every connection.
    pub fn stop_server(&mut self) {
        let actions = self.server.stop();
        self.apply_server_actions(actions);
    }

    /// Advance virtual time and tick every endpoint.
    pub fn advance(&mut self, by: std::time::Duration) {
        self.env.advance(by);

        match self.server.process_event(ServerEvent::Tick) {
            Ok(actions) => self.apply_server_actions(actions),
            Err(e) => tracing::warn!("server tick failed: {e}"),
        }

        let conn_ids: Vec<_> = self.clients.keys().copied().collect();
        for conn_id in conn_ids {
            if let Some(client) = self.clients.get_mut(&conn_id) {
                let result = client.handle(ClientEvent::Tick);
                self.apply_client_result(conn_id, result);
            }
        }
    }

    /// Deliver the oldest queued item. Returns `false` if the queue was empty.
    pub fn step(&mut self) -> bool {
        let Some(delivery) = self.queue.pop_front() else {
            return false;
        };
        self.deliver(delivery);
        true
    }

    /// Deliver until the queue is empty.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Put a frame on the wire as if `to`'s peer had sent it.
    pub fn inject(&mut self, to: Endpoint, channel: Channel, frame: Bytes) {
        self.queue.push_back(Delivery::Frame { to, channel, frame });
    }

    /// Items waiting for delivery, oldest first.
    pub fn pending(&self) -> &VecDeque<Delivery> {
        &self.queue
    }

    /// Mutable access to the queue for dropping, reordering or tampering.
    pub fn pending_mut(&mut self) -> &mut VecDeque<Delivery> {
        &mut self.queue
    }

    /// Take the server's application-visible actions (everything except
    /// frames, closes and logs) since the last call.
    pub fn take_server_events(&mut self) -> Vec<ServerAction> {
        std::mem::take(&mut self.server_log)
    }

    /// Take a client's application-visible actions since the last call.
    pub fn take_client_events(&mut self, conn_id: ConnectionId) -> Vec<ClientAction> {
        self.client_logs.get_mut(&conn_id).map(std::mem::take).unwrap_or_default()
    }

    /// Take every rejected event since the last call.
    pub fn take_rejections(&mut self) -> Vec<Rejection> {
        std::mem::take(&mut self.rejections)
    }

    /// The server driver.
    pub fn server(&self) -> &ServerDriver<SimEnv> {
        &self.server
    }

    /// A client by connection id.
    pub fn client(&self, conn_id: ConnectionId) -> Option<&Client<SimEnv>> {
        self.clients.get(&conn_id)
    }

    /// Shared simulation environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    fn deliver(&mut self, delivery: Delivery) {
        tracing::trace!(?delivery, "sim deliver");
        match delivery {
            Delivery::Frame { to: Endpoint::Server(conn_id), channel, frame } => {
                let result = self.server.process_event(ServerEvent::DataReceived { conn_id, channel, frame });
                self.apply_server_result(conn_id, result);
            },
            Delivery::Frame { to: Endpoint::Client(conn_id), channel, frame } => {
                let Some(client) = self.clients.get_mut(&conn_id) else {
                    return;
                };
                let result = client.handle(ClientEvent::DataReceived { channel, frame });
                self.apply_client_result(conn_id, result);
            },
            Delivery::Close { to: Endpoint::Server(conn_id), reason } => {
                let result = self.server.process_event(ServerEvent::ConnectionClosed { conn_id, reason });
                self.apply_server_result(conn_id, result);
            },
            Delivery::Close { to: Endpoint::Client(conn_id), reason } => {
                let Some(client) = self.clients.get_mut(&conn_id) else {
                    return;
                };
                let result = client.handle(ClientEvent::Disconnected { reason });
                self.apply_client_result(conn_id, result);
            },
        }
    }

    fn apply_server_result(&mut self, conn_id: ConnectionId, result: Result<Vec<ServerAction>, ChannelError>) {
        match result {
            Ok(actions) => self.apply_server_actions(actions),
            Err(error) => self.rejections.push(Rejection { at: Endpoint::Server(conn_id), error }),
        }
    }

    fn apply_client_result(&mut self, conn_id: ConnectionId, result: Result<Vec<ClientAction>, ChannelError>) {
        match result {
            Ok(actions) => self.apply_client_actions(conn_id, actions),
            Err(error) => self.rejections.push(Rejection { at: Endpoint::Client(conn_id), error }),
        }
    }

    fn apply_server_actions(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendFrame { conn_id, channel, frame } => {
                    if self.open.contains(&conn_id) {
                        self.queue.push_back(Delivery::Frame { to: Endpoint::Client(conn_id), channel, frame });
                    }
                },
                ServerAction::CloseConnection { conn_id, reason } => {
                    if self.open.remove(&conn_id) {
                        self.queue.push_back(Delivery::Close { to: Endpoint::Client(conn_id), reason });
                    }
                },
                ServerAction::Log { level, message } => tracing::debug!(?level, "server: {message}"),
                other => self.server_log.push(other),
            }
        }
    }

    fn apply_client_actions(&mut self, conn_id: ConnectionId, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::SendFrame { channel, frame } => {
                    if self.open.contains(&conn_id) {
                        self.queue.push_back(Delivery::Frame { to: Endpoint::Server(conn_id), channel, frame });
                    }
                },
                ClientAction::Close { reason } => {
                    if self.open.remove(&conn_id) {
                        self.queue.push_back(Delivery::Close { to: Endpoint::Server(conn_id), reason });
                    }
                },
                ClientAction::Log { message } => tracing::debug!(conn_id, "client: {message}"),
                other => self.client_logs.entry(conn_id).or_default().push(other),
            }
        }
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("elapsed", &self.env.elapsed())
            .field("clients", &self.clients.len())
            .field("pending", &self.queue.len())
            .finish_non_exhaustive()
    }
}
