//! Shroud Protocol Core
//!
//! Protocol logic shared by server and client: the environment abstraction,
//! channel configuration, the per-connection key exchange, the session store
//! and the secure message pipeline. Nothing here performs I/O; the server
//! driver and client state machines compose these pieces and the runtimes
//! execute the resulting actions. The `system` feature adds `SystemEnv`,
//! the environment both runtimes run on.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod handshake;
pub mod pipeline;
pub mod session;
#[cfg(feature = "system")]
mod system_env;

pub use config::{ChannelConfig, KeyRebindPolicy};
pub use env::Environment;
pub use error::ChannelError;
pub use handshake::{Handshake, HandshakeState, KeyAccepted};
pub use pipeline::{Direction, SecureChannel};
pub use session::{ConnectionId, SessionStore};
#[cfg(feature = "system")]
pub use system_env::SystemEnv;
