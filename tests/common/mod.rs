//! Shared utilities for integration tests.
//!
//! Provides a controller and a peer session joined by two loopback links,
//! plus a deterministic proptest runner.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::sync::Arc;

use bleframe::{
    config::TransferConfig,
    link::{ChannelId, PeerId},
    loopback::{LoopbackLink, loopback},
    session::{ChannelRole, LinkSession, LinkSessionBuilder, Role},
    transfer::TransferEvent,
};
use bytes::Bytes;
use proptest::test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner};
use tokio::sync::mpsc;

pub const BUDGET: usize = 20;
pub const WRITES: ChannelId = ChannelId::from_u128(0xfe00, 0x2a01);
pub const REQUESTS: ChannelId = ChannelId::from_u128(0xfe00, 0x2a02);
pub const BOUNDED: ChannelId = ChannelId::from_u128(0xfe00, 0x2a03);

pub fn controller_addr() -> PeerId { PeerId::from("00:00:00:00:00:01") }

pub fn peer_addr() -> PeerId { PeerId::from("00:00:00:00:00:02") }

/// Two sessions wired back to back.
pub struct Pair {
    pub controller: LinkSession,
    pub peer: LinkSession,
    /// Link carrying controller packets to the peer.
    pub to_peer: Arc<LoopbackLink>,
    /// Link carrying peer packets to the controller.
    pub to_controller: Arc<LoopbackLink>,
    /// Plain payloads completed at the peer.
    pub delivered: mpsc::UnboundedReceiver<(PeerId, ChannelId, Bytes)>,
    /// Events observed by the peer.
    pub peer_events: mpsc::UnboundedReceiver<TransferEvent>,
}

fn wire(builder: LinkSessionBuilder) -> LinkSessionBuilder {
    builder
        .channel(WRITES, ChannelRole::ChunkedWrite)
        .channel(REQUESTS, ChannelRole::ChunkedRequest)
        .channel(BOUNDED, ChannelRole::BoundedRequest)
}

/// Build a controller and a peer sharing `config`.
pub fn pair(config: TransferConfig) -> Pair {
    let (to_peer, peer_port) = loopback(BUDGET);
    let (to_controller, controller_port) = loopback(BUDGET);
    let (delivered_tx, delivered) = mpsc::unbounded_channel();
    let (events_tx, peer_events) = mpsc::unbounded_channel();

    let controller = wire(LinkSession::builder(to_peer.clone(), Role::Controller))
        .config(config)
        .build();
    let peer = wire(LinkSession::builder(to_controller.clone(), Role::Peer))
        .config(config)
        .sink(delivered_tx)
        .listener(events_tx)
        .build();
    peer_port.pump(peer.clone(), controller_addr());
    controller_port.pump(controller.clone(), peer_addr());

    Pair {
        controller,
        peer,
        to_peer,
        to_controller,
        delivered,
        peer_events,
    }
}

/// Payload of `len` bytes with a recognisable pattern.
pub fn payload(len: usize) -> Vec<u8> { (0..=250_u8).cycle().take(len).collect() }

/// Proptest runner with a fixed seed.
pub fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha))
}
