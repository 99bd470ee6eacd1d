//! Demo binary moving one payload across an in-memory link.
//!
//! Parses CLI arguments, wires a controller and a peer session together
//! through two loopback links and reports how the transfer went.

mod cli;

use std::error::Error;

use bleframe::{
    config::TransferConfig,
    link::{ChannelId, PeerId},
    loopback::loopback,
    session::{ChannelRole, LinkSession, Role},
};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const SERVICE: u128 = 0x0000_fe00_0000_1000_8000_0080_5f9b_34fb;
const WRITES: ChannelId = ChannelId::from_u128(SERVICE, 0x2a01);
const REQUESTS: ChannelId = ChannelId::from_u128(SERVICE, 0x2a02);

fn session_config(mode: cli::Mode) -> TransferConfig {
    match mode {
        cli::Mode::ServiceAware => TransferConfig::service_aware(),
        cli::Mode::Legacy => TransferConfig::legacy(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    let config = session_config(cli.mode);
    let controller_addr = PeerId::from("00:00:00:00:00:01");
    let peer_addr = PeerId::from("00:00:00:00:00:02");

    let (to_peer, peer_port) = loopback(cli.budget);
    let (to_controller, controller_port) = loopback(cli.budget);
    let (delivered_tx, mut delivered) = mpsc::unbounded_channel();

    let controller = LinkSession::builder(to_peer, Role::Controller)
        .config(config)
        .channel(WRITES, ChannelRole::ChunkedWrite)
        .channel(REQUESTS, ChannelRole::ChunkedRequest)
        .build();
    let peer = LinkSession::builder(to_controller, Role::Peer)
        .config(config)
        .channel(WRITES, ChannelRole::ChunkedWrite)
        .channel(REQUESTS, ChannelRole::ChunkedRequest)
        .sink(delivered_tx)
        .build();
    let _pumps = (
        peer_port.pump(peer.clone(), controller_addr),
        controller_port.pump(controller.clone(), peer_addr.clone()),
    );

    let payload: Vec<u8> = (0..=250_u8).cycle().take(cli.payload_len).collect();
    if cli.request {
        let reply = controller
            .request_chunked(&peer_addr, &REQUESTS, &payload)
            .await?;
        let intact = reply[..] == payload[..];
        println!("request answered with {} bytes (intact: {intact})", reply.len());
    } else {
        controller
            .write_chunked(&peer_addr, &WRITES, &payload)
            .await
            .into_result()?;
        if let Some((_, _, received)) = delivered.recv().await {
            let intact = received[..] == payload[..];
            println!("peer received {} bytes (intact: {intact})", received.len());
        }
    }

    peer.shutdown().await;
    controller.shutdown().await;
    Ok(())
}
