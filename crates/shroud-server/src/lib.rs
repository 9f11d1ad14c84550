//! Shroud production server.
//!
//! Production server implementation using TCP for transport, Tokio for the
//! async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! [`ServerDriver`] holds all protocol logic (key exchange, sealing, opening)
//! and follows the Sans-IO pattern: events in, actions out. [`Server`] owns
//! the sockets, feeds transport events to the driver behind a single
//! `tokio::sync::Mutex` and executes the returned actions. No socket I/O
//! happens under that lock: outbound frames go into a bounded per-connection
//! queue drained by a writer task, and a client that stops reading is
//! disconnected once its queue fills. Applications talk
//! to a running server through a [`ServerHandle`] and receive
//! [`ServerNotification`]s in the same shape a plain transport would deliver
//! them, except that payloads are already decrypted and "connected" fires only
//! after the key exchange.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`Server`]: Production runtime that executes `ServerDriver` actions
//! - [`TcpTransport`]: TCP listener
//! - [`SystemEnv`]: Production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod transport;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use shroud_core::SystemEnv;
use shroud_core::{ChannelError, ConnectionId, Environment};
use shroud_proto::{Channel, StreamError};
pub use shroud_proto::{read_packet, write_packet};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, Notify, RwLock, mpsc, watch},
};
pub use transport::TcpTransport;

/// Default interval between handshake timeout checks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Frames a connection may have waiting for its socket. A client that lets
/// its queue fill is disconnected.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// How long a closed connection may spend flushing queued frames.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:7777")
    pub bind_address: String,
    /// Interval between `Tick` events
    pub tick_interval: Duration,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7777".to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            driver: DriverConfig::default(),
        }
    }
}

/// Events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    /// Key exchange with a client finished
    Connected {
        /// Established connection
        conn_id: ConnectionId,
    },
    /// Decrypted payload from a client
    Data {
        /// Originating connection
        conn_id: ConnectionId,
        /// Channel the payload was sent on
        channel: Channel,
        /// Plaintext
        payload: Bytes,
    },
    /// An established client went away
    Disconnected {
        /// Connection that went away
        conn_id: ConnectionId,
    },
    /// Transport error or handshake timeout on a connection
    Error {
        /// Affected connection
        conn_id: ConnectionId,
        /// What went wrong
        error: ChannelError,
    },
}

/// Socket state for one connection.
struct ConnectionEntry {
    /// Queue of the connection's writer task. Frames leave in the order the
    /// driver produced them.
    outbound: mpsc::Sender<(Channel, Bytes)>,
    /// Peer address
    addr: SocketAddr,
    /// Wakes the reader task when the server closes the connection
    close: Notify,
}

/// Shared state for all connections.
struct SharedState {
    driver: Mutex<ServerDriver<SystemEnv>>,
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionEntry>>>,
    notifications: mpsc::UnboundedSender<ServerNotification>,
    shutdown: watch::Sender<bool>,
    next_conn_id: AtomicU64,
    max_packet_size: usize,
}

/// Production Shroud server.
///
/// Wraps `ServerDriver` with a TCP listener and the system environment.
pub struct Server {
    transport: TcpTransport,
    shared: Arc<SharedState>,
    notifications: Option<mpsc::UnboundedReceiver<ServerNotification>>,
    env: SystemEnv,
    tick_interval: Duration,
}

impl Server {
    /// Bind the listener and start the driver (generates the server key
    /// pair).
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.tick_interval.is_zero() {
            return Err(ServerError::Config("tick interval must be non-zero".to_string()));
        }

        let env = SystemEnv::new();
        let max_packet_size = config.driver.channel.max_packet_size;
        let mut driver = ServerDriver::new(env.clone(), config.driver);
        let start_actions = driver.start();

        let transport = TcpTransport::bind(&config.bind_address).await?;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let shared = Arc::new(SharedState {
            driver: Mutex::new(driver),
            connections: RwLock::new(HashMap::new()),
            notifications: notify_tx,
            shutdown: shutdown_tx,
            next_conn_id: AtomicU64::new(1),
            max_packet_size,
        });
        shared.execute_actions(start_actions).await;

        Ok(Self {
            transport,
            shared,
            notifications: Some(notify_rx),
            env,
            tick_interval: config.tick_interval,
        })
    }

    /// Handle for sending, disconnecting and querying while the server runs.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { shared: Arc::clone(&self.shared) }
    }

    /// Take the notification stream. `None` after the first call.
    pub fn notifications(&mut self) -> Option<mpsc::UnboundedReceiver<ServerNotification>> {
        self.notifications.take()
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and driving handshake timeouts.
    ///
    /// Returns after [`ServerHandle::stop`].
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let tick = tokio::spawn(tick_loop(
            Arc::clone(&self.shared),
            self.env.clone(),
            self.tick_interval,
        ));

        let mut shutdown = self.shared.shutdown.subscribe();
        loop {
            tokio::select! {
                () = stopped(&mut shutdown) => break,
                accepted = self.transport.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let shared = Arc::clone(&self.shared);
                        let conn_id = shared.next_conn_id.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(handle_connection(shared, stream, addr, conn_id));
                    },
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    },
                },
            }
        }

        tick.abort();
        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Application handle to a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<SharedState>,
}

impl ServerHandle {
    /// Seal `payload` and send it to `conn_id` on `channel`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Channel(UnresolvedSession)` before the key exchange
    ///   finished; nothing is sent
    /// - `ServerError::Channel(UnknownConnection)` for an unknown id
    pub async fn send(
        &self,
        conn_id: ConnectionId,
        channel: Channel,
        payload: impl Into<Bytes>,
    ) -> Result<(), ServerError> {
        let event = ServerEvent::Send { conn_id, channel, payload: payload.into() };
        Ok(self.shared.dispatch_checked(event).await?)
    }

    /// Close a connection. Its session is discarded immediately.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        self.shared.dispatch(ServerEvent::Disconnect { conn_id }).await;
    }

    /// Remote address of a connection. `None` if unknown.
    pub async fn client_address(&self, conn_id: ConnectionId) -> Option<SocketAddr> {
        self.shared.connections.read().await.get(&conn_id).map(|entry| entry.addr)
    }

    /// Maximum frame size of the transport.
    pub fn max_packet_size(&self) -> usize {
        self.shared.max_packet_size
    }

    /// True until [`ServerHandle::stop`].
    pub async fn is_active(&self) -> bool {
        self.shared.driver.lock().await.is_active()
    }

    /// Number of connections that completed the key exchange.
    pub async fn established_count(&self) -> usize {
        self.shared.driver.lock().await.established_count()
    }

    /// Stop the server: close every connection, drop the key pair, end
    /// [`Server::run`].
    pub async fn stop(&self) {
        {
            let mut driver = self.shared.driver.lock().await;
            let actions = driver.stop();
            self.shared.execute_actions(actions).await;
        }
        self.shared.shutdown.send_replace(true);
    }
}

impl SharedState {
    /// Process an event; per-message errors are logged and dropped.
    async fn dispatch(&self, event: ServerEvent) {
        if let Err(e) = self.dispatch_checked(event).await {
            tracing::warn!("Message dropped: {}", e);
        }
    }

    /// Process an event and execute its actions.
    async fn dispatch_checked(&self, event: ServerEvent) -> Result<(), ChannelError> {
        let mut driver = self.driver.lock().await;
        let actions = driver.process_event(event)?;
        self.execute_actions(actions).await;
        Ok(())
    }

    /// Execute server actions.
    ///
    /// Runs under the driver lock, so nothing here waits on a socket.
    async fn execute_actions(&self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendFrame { conn_id, channel, frame } => {
                    let entry = self.connections.read().await.get(&conn_id).cloned();
                    let Some(entry) = entry else {
                        tracing::warn!("SendFrame: connection {} not found", conn_id);
                        continue;
                    };

                    match entry.outbound.try_send((channel, frame)) {
                        Ok(()) => {},
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!("Connection {} is not reading, dropping it", conn_id);
                            self.close_connection(conn_id).await;
                        },
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            tracing::debug!("SendFrame: writer for {} already gone", conn_id);
                        },
                    }
                },

                ServerAction::CloseConnection { conn_id, reason } => {
                    tracing::info!("Closing connection {}: {}", conn_id, reason);
                    self.close_connection(conn_id).await;
                },

                ServerAction::Connected { conn_id } => {
                    self.notify(ServerNotification::Connected { conn_id });
                },

                ServerAction::Deliver { conn_id, channel, payload } => {
                    self.notify(ServerNotification::Data { conn_id, channel, payload });
                },

                ServerAction::Disconnected { conn_id } => {
                    self.notify(ServerNotification::Disconnected { conn_id });
                },

                ServerAction::Error { conn_id, error } => {
                    self.notify(ServerNotification::Error { conn_id, error });
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    /// Forget the connection's socket and wake its reader. The writer flushes
    /// what is queued, then shuts the stream down.
    async fn close_connection(&self, conn_id: ConnectionId) {
        let entry = self.connections.write().await.remove(&conn_id);
        if let Some(entry) = entry {
            entry.close.notify_one();
        }
    }

    fn notify(&self, notification: ServerNotification) {
        if self.notifications.send(notification).is_err() {
            tracing::debug!("Notification dropped: no application listening");
        }
    }
}

/// Handle a single TCP connection until either side closes it.
async fn handle_connection(
    shared: Arc<SharedState>,
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
) {
    tracing::debug!("New connection {} from {}", conn_id, addr);

    let (mut reader, writer) = stream.into_split();
    let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let mut writer_task = tokio::spawn(write_loop(writer, queue, conn_id, shared.max_packet_size));

    let entry = Arc::new(ConnectionEntry { outbound, addr, close: Notify::new() });
    shared.connections.write().await.insert(conn_id, Arc::clone(&entry));

    shared.dispatch(ServerEvent::ConnectionOpened { conn_id }).await;

    let reason = loop {
        tokio::select! {
            () = entry.close.notified() => break "closed by server".to_string(),
            packet = read_packet(&mut reader, shared.max_packet_size) => match packet {
                Ok(Some((channel, frame))) => {
                    shared.dispatch(ServerEvent::DataReceived { conn_id, channel, frame }).await;
                },
                Ok(None) => break "peer closed".to_string(),
                Err(StreamError::Protocol(e)) => {
                    tracing::warn!("Dropping connection {}: {}", conn_id, e);
                    break e.to_string();
                },
                Err(e) => {
                    let error = e.to_string();
                    shared
                        .dispatch(ServerEvent::TransportError { conn_id, error: error.clone() })
                        .await;
                    break error;
                },
            },
        }
    };

    shared.connections.write().await.remove(&conn_id);
    shared.dispatch(ServerEvent::ConnectionClosed { conn_id, reason }).await;

    // Last sender goes with the entry; the writer drains and shuts down
    drop(entry);
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        tracing::debug!("Connection {} did not drain in time", conn_id);
        writer_task.abort();
    }
}

/// Write queued frames to one connection until its queue closes.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<(Channel, Bytes)>,
    conn_id: ConnectionId,
    max_packet_size: usize,
) {
    while let Some((channel, frame)) = queue.recv().await {
        if let Err(e) = write_packet(&mut writer, channel, &frame, max_packet_size).await {
            tracing::warn!("Write to {} failed: {}", conn_id, e);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Shutdown of {} failed: {}", conn_id, e);
    }
}

/// Feed periodic `Tick` events to the driver until shutdown.
async fn tick_loop(shared: Arc<SharedState>, env: SystemEnv, interval: Duration) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            () = stopped(&mut shutdown) => break,
            () = env.sleep(interval) => shared.dispatch(ServerEvent::Tick).await,
        }
    }
}

/// Resolves once the server is stopped. Drops the watch borrow before
/// returning, which keeps the enclosing `select!` future `Send`.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // Err only if the sender is gone, which also means stopped
    let _ = shutdown.wait_for(|&stopped| stopped).await;
}
