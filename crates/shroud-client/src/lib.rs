//! Client
//!
//! Action-based client state machine for the Shroud secure channel. Performs
//! the key exchange with a server, then seals outbound payloads and opens
//! inbound ones.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`shroud_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Client with TCP transport
//! - [`transport::connect`]: Connect to a server

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod event;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use event::{ClientAction, ClientEvent};
pub use shroud_core::{ChannelConfig, ChannelError, Environment, HandshakeState, KeyRebindPolicy};
