//! Shroud server binary.
//!
//! Runs an echo application over the secure channel: every decrypted payload
//! is sealed again and sent back on the channel it arrived on.
//!
//! # Usage
//!
//! ```bash
//! shroud-server --bind 0.0.0.0:7777
//!
//! # Verbose, with per-message size logging
//! RUST_LOG=debug shroud-server --bind 127.0.0.1:7777 --log-payloads
//! ```

use std::time::Duration;

use clap::Parser;
use shroud_core::{ChannelConfig, KeyRebindPolicy};
use shroud_server::{DriverConfig, Server, ServerHandle, ServerNotification, ServerRuntimeConfig};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Shroud secure channel server
#[derive(Parser, Debug)]
#[command(name = "shroud-server")]
#[command(about = "Opportunistic end-to-end encrypted echo server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Maximum frame size in bytes
    #[arg(long, default_value = "16384")]
    max_packet_size: usize,

    /// Seconds a client has to answer with its public key
    #[arg(long, default_value = "10")]
    handshake_timeout_secs: u64,

    /// Let clients replace their public key on an established connection
    #[arg(long)]
    allow_key_rebind: bool,

    /// Log raw and decrypted sizes of every message
    #[arg(long)]
    log_payloads: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn runtime_config(&self) -> ServerRuntimeConfig {
        let rebind_policy =
            if self.allow_key_rebind { KeyRebindPolicy::Replace } else { KeyRebindPolicy::Reject };

        ServerRuntimeConfig {
            bind_address: self.bind.clone(),
            driver: DriverConfig {
                channel: ChannelConfig {
                    handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
                    max_packet_size: self.max_packet_size,
                    rebind_policy,
                    log_payloads: self.log_payloads,
                },
                max_connections: self.max_connections,
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Shroud server starting");
    tracing::info!("Binding to {}", args.bind);

    let mut server = Server::bind(args.runtime_config()).await?;
    let handle = server.handle();
    let notifications =
        server.notifications().ok_or("notification stream already taken")?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::spawn(echo(handle.clone(), notifications));

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shutdown.stop().await;
        }
    });

    server.run().await?;

    Ok(())
}

/// Echo every payload back to its sender.
async fn echo(handle: ServerHandle, mut notifications: mpsc::UnboundedReceiver<ServerNotification>) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            ServerNotification::Connected { conn_id } => {
                let addr = handle.client_address(conn_id).await;
                tracing::info!("Client {} connected from {:?}", conn_id, addr);
            },
            ServerNotification::Data { conn_id, channel, payload } => {
                if let Err(e) = handle.send(conn_id, channel, payload).await {
                    tracing::warn!("Echo to {} failed: {}", conn_id, e);
                }
            },
            ServerNotification::Disconnected { conn_id } => {
                tracing::info!("Client {} disconnected", conn_id);
            },
            ServerNotification::Error { conn_id, error } => {
                tracing::warn!("Client {} error: {}", conn_id, error);
            },
        }
    }
}
