//! Deterministic simulation harness for Shroud protocol testing.
//!
//! Runs the Sans-IO [`ServerDriver`](shroud_server::ServerDriver) and any
//! number of [`Client`](shroud_client::Client)s against each other in memory.
//! Time is virtual and randomness is seeded, so a scenario replays byte for
//! byte from its seed.
//!
//! Packets sit in an inspectable queue between the endpoints; tests can drop,
//! reorder, tamper with or inject frames before delivering them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod sim_network;

pub use sim_env::SimEnv;
pub use sim_network::{Delivery, Endpoint, Rejection, SimNetwork};
