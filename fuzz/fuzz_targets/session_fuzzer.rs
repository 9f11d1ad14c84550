//! Fuzz target for server and client sessions
//!
//! Drives the simulated network with arbitrary operations: connects,
//! disconnects, sends, clock jumps, dropped, duplicated and corrupted frames.
//!
//! # Invariants
//!
//! - Nothing panics
//! - The server never holds more sessions than connected clients
//! - Every payload the server delivers was sent by a client on that
//!   connection

#![no_main]

use std::{collections::BTreeSet, time::Duration};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use shroud_harness::{Delivery, SimNetwork};
use shroud_proto::Channel;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    ops: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Connect { id: u8 },
    ClientSend { id: u8, channel: u8, payload: Vec<u8> },
    ServerSend { id: u8, channel: u8, payload: Vec<u8> },
    ClientDisconnect { id: u8 },
    ServerDisconnect { id: u8 },
    Step,
    Run,
    Advance { millis: u16 },
    Drop,
    Duplicate,
    Corrupt { index: u16, mask: u8 },
}

fuzz_target!(|scenario: Scenario| {
    let mut net = SimNetwork::with_seed(scenario.seed);
    let mut sent: BTreeSet<(u64, Vec<u8>)> = BTreeSet::new();
    let mut connected: BTreeSet<u64> = BTreeSet::new();

    for op in scenario.ops {
        match op {
            Op::Connect { id } => {
                let id = u64::from(id % 8) + 1;
                if connected.insert(id) {
                    net.connect_as(id);
                }
            },
            Op::ClientSend { id, channel, payload } => {
                let id = u64::from(id % 8) + 1;
                if net.client_send(id, Channel(channel % 2), &payload).is_ok() {
                    sent.insert((id, payload));
                }
            },
            Op::ServerSend { id, channel, payload } => {
                let _ = net.server_send(u64::from(id % 8) + 1, Channel(channel % 2), &payload);
            },
            Op::ClientDisconnect { id } => net.client_disconnect(u64::from(id % 8) + 1),
            Op::ServerDisconnect { id } => net.server_disconnect(u64::from(id % 8) + 1),
            Op::Step => {
                net.step();
            },
            Op::Run => net.run(),
            Op::Advance { millis } => net.advance(Duration::from_millis(u64::from(millis) * 10)),
            Op::Drop => {
                net.pending_mut().pop_front();
            },
            Op::Duplicate => {
                if let Some(front) = net.pending().front().cloned() {
                    net.pending_mut().push_back(front);
                }
            },
            Op::Corrupt { index, mask } => {
                if let Some(Delivery::Frame { frame, .. }) = net.pending_mut().front_mut() {
                    if !frame.is_empty() {
                        let mut bytes = frame.to_vec();
                        let i = usize::from(index) % bytes.len();
                        bytes[i] ^= mask;
                        *frame = Bytes::from(bytes);
                    }
                }
            },
        }

        assert!(net.server().connection_count() <= connected.len());

        for action in net.take_server_events() {
            if let shroud_server::ServerAction::Deliver { conn_id, payload, .. } = action {
                assert!(
                    sent.contains(&(conn_id, payload.to_vec())),
                    "server delivered a payload no client on {conn_id} sent"
                );
            }
        }
    }
});
