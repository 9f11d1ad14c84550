//! TCP transport for the client.
//!
//! Provides [`ConnectedClient`], which owns the socket and drives the Sans-IO
//! [`Client`]: a reader task feeds received packets in, a tick task enforces
//! the handshake deadline, and the resulting actions are executed here.
//! Protocol logic stays in [`Client`].

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use shroud_core::{ChannelConfig, ChannelError, Environment, SystemEnv};
use shroud_crypto::PublicKey;
use shroud_proto::{Channel, StreamError, read_packet, write_packet};
use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, Notify, mpsc},
    task::AbortHandle,
};

use crate::{Client, ClientAction, ClientEvent};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed or was closed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream I/O error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Packet framing error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client rejected the operation.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<StreamError> for TransportError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Protocol(e) => Self::Protocol(e.to_string()),
            other => Self::Stream(other.to_string()),
        }
    }
}

/// Event surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotification {
    /// Key exchange finished; payloads may be sent.
    Connected,
    /// Decrypted payload from the server.
    Data {
        /// Channel the payload arrived on.
        channel: Channel,
        /// Plaintext.
        payload: Bytes,
    },
    /// Established connection went away.
    Disconnected,
    /// Transport error or handshake timeout.
    Error(ChannelError),
}

/// Handle to a client connected over TCP.
///
/// Notifications stop (`recv` returns `None`) once the connection is gone.
pub struct ConnectedClient {
    shared: Arc<Shared>,
    notifications: mpsc::UnboundedReceiver<ClientNotification>,
    reader: AbortHandle,
    ticker: AbortHandle,
}

impl ConnectedClient {
    /// Connect to a server. Same as [`connect`].
    pub async fn connect(server_addr: &str, config: ChannelConfig) -> Result<Self, TransportError> {
        connect(server_addr, config).await
    }

    /// Seal `payload` and send it on `channel`.
    ///
    /// # Errors
    ///
    /// - `TransportError::Channel` if the key exchange has not finished
    ///   (`UnresolvedSession`), the client is disconnected (`NotActive`), or
    ///   the frame exceeds the maximum packet size
    /// - `TransportError::Stream` if the socket write fails
    pub async fn send(&self, channel: Channel, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        self.shared.dispatch_checked(ClientEvent::Send { channel, payload: payload.into() }).await
    }

    /// Next notification. `None` once the connection is closed and all
    /// pending notifications were received.
    pub async fn recv(&mut self) -> Option<ClientNotification> {
        self.notifications.recv().await
    }

    /// Wait until the key exchange finishes.
    ///
    /// # Errors
    ///
    /// - `TransportError::Channel` carrying `HandshakeTimeout` if the server
    ///   never sent its key
    /// - `TransportError::Connection` if the connection closed first
    pub async fn wait_connected(&mut self) -> Result<(), TransportError> {
        loop {
            match self.recv().await {
                Some(ClientNotification::Connected) => return Ok(()),
                Some(ClientNotification::Error(error)) => return Err(error.into()),
                Some(other) => tracing::debug!("ignoring {:?} while connecting", other),
                None => {
                    return Err(TransportError::Connection(
                        "connection closed before key exchange".to_string(),
                    ));
                },
            }
        }
    }

    /// True once the server's key is stored.
    pub async fn is_connected(&self) -> bool {
        self.shared.client.lock().await.is_connected()
    }

    /// Server's public key. `None` until connected.
    pub async fn server_key(&self) -> Option<PublicKey> {
        self.shared.client.lock().await.server_key()
    }

    /// Maximum frame size of the transport.
    pub fn max_packet_size(&self) -> usize {
        self.shared.max_packet_size
    }

    /// Close the connection.
    pub async fn disconnect(&self) {
        self.shared.dispatch(ClientEvent::Disconnect).await;
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.ticker.abort();
    }
}

/// Connect to a Shroud server over TCP.
///
/// Returns as soon as the socket is open; the key exchange completes in the
/// background and is reported as [`ClientNotification::Connected`].
pub async fn connect(server_addr: &str, config: ChannelConfig) -> Result<ConnectedClient, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address '{server_addr}': {e}")))?;

    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connection(format!("connect to {addr} failed: {e}")))?;
    stream.set_nodelay(true).map_err(|e| TransportError::Stream(e.to_string()))?;

    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let tick_interval = tick_interval(&config);

    let shared = Arc::new(Shared {
        max_packet_size: config.max_packet_size,
        client: Mutex::new(Client::new(SystemEnv, config)),
        writer: Mutex::new(Some(writer)),
        notifications: Mutex::new(Some(tx)),
        close: Notify::new(),
    });

    shared.dispatch(ClientEvent::Connect).await;
    tracing::debug!("connected to {}", addr);

    let tick_task = tokio::spawn(tick_loop(Arc::clone(&shared), tick_interval));
    let ticker = tick_task.abort_handle();
    let reader =
        tokio::spawn(read_loop(Arc::clone(&shared), reader, tick_task.abort_handle())).abort_handle();

    Ok(ConnectedClient { shared, notifications: rx, reader, ticker })
}

/// State shared between the handle and its tasks.
///
/// Lock order: client, then writer, then notifications.
struct Shared {
    client: Mutex<Client<SystemEnv>>,
    /// `None` once the connection was closed locally.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Dropped when the reader exits so `recv` ends.
    notifications: Mutex<Option<mpsc::UnboundedSender<ClientNotification>>>,
    close: Notify,
    max_packet_size: usize,
}

impl Shared {
    /// Process an event, logging rejected ones.
    async fn dispatch(&self, event: ClientEvent) {
        if let Err(e) = self.dispatch_checked(event).await {
            tracing::warn!("client error: {}", e);
        }
    }

    /// Process an event and execute its actions in order.
    ///
    /// The client lock is held until every action ran, so frames reach the
    /// socket in the order the client produced them.
    async fn dispatch_checked(&self, event: ClientEvent) -> Result<(), TransportError> {
        let mut client = self.client.lock().await;
        let actions = client.handle(event)?;
        for action in actions {
            self.execute(action).await?;
        }
        Ok(())
    }

    async fn execute(&self, action: ClientAction) -> Result<(), TransportError> {
        match action {
            ClientAction::SendFrame { channel, frame } => {
                let mut writer = self.writer.lock().await;
                let Some(writer) = writer.as_mut() else {
                    return Err(TransportError::Connection("connection closed".to_string()));
                };
                write_packet(writer, channel, &frame, self.max_packet_size).await?;
            },
            ClientAction::Close { reason } => {
                tracing::debug!("closing connection: {}", reason);
                if let Some(mut writer) = self.writer.lock().await.take() {
                    if let Err(e) = writer.shutdown().await {
                        tracing::debug!("shutdown failed: {}", e);
                    }
                }
                self.close.notify_one();
            },
            ClientAction::Connected => self.notify(ClientNotification::Connected).await,
            ClientAction::Deliver { channel, payload } => {
                self.notify(ClientNotification::Data { channel, payload }).await;
            },
            ClientAction::Disconnected => self.notify(ClientNotification::Disconnected).await,
            ClientAction::Error(error) => self.notify(ClientNotification::Error(error)).await,
            ClientAction::Log { message } => tracing::debug!("{}", message),
        }
        Ok(())
    }

    async fn notify(&self, notification: ClientNotification) {
        if let Some(tx) = self.notifications.lock().await.as_ref() {
            // Receiver gone means the handle was dropped; nothing to tell.
            let _ = tx.send(notification);
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf, ticker: AbortHandle) {
    loop {
        tokio::select! {
            () = shared.close.notified() => break,
            result = read_packet(&mut reader, shared.max_packet_size) => match result {
                Ok(Some((channel, frame))) => {
                    shared.dispatch(ClientEvent::DataReceived { channel, frame }).await;
                },
                Ok(None) => {
                    let reason = "server closed connection".to_string();
                    shared.dispatch(ClientEvent::Disconnected { reason }).await;
                    break;
                },
                Err(e) => {
                    let error = e.to_string();
                    shared.dispatch(ClientEvent::TransportError { error: error.clone() }).await;
                    shared.dispatch(ClientEvent::Disconnected { reason: error }).await;
                    break;
                },
            },
        }
    }

    ticker.abort();
    shared.notifications.lock().await.take();
}

async fn tick_loop(shared: Arc<Shared>, interval: Duration) {
    loop {
        SystemEnv.sleep(interval).await;
        shared.dispatch(ClientEvent::Tick).await;
    }
}

/// Tick often enough to notice a missed handshake deadline promptly.
fn tick_interval(config: &ChannelConfig) -> Duration {
    (config.handshake_timeout / 10).clamp(Duration::from_millis(10), Duration::from_secs(1))
}
