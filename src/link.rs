//! Collaborator seams between the protocol and the radio stack.
//!
//! The protocol never talks to a GATT server directly. It sends raw packets
//! through a [`RawLink`], hands finished plain payloads to a [`PayloadSink`]
//! and asks a [`RequestHandler`] to answer inbound requests.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default packet budget: a 23-byte ATT MTU minus the 3-byte ATT header.
pub const DEFAULT_PACKET_BUDGET: usize = 20;

/// Stable address of a remote party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Arc<str>);

impl PeerId {
    /// Wrap a peer address.
    #[must_use]
    pub fn new(address: impl Into<Arc<str>>) -> Self { Self(address.into()) }

    /// Borrow the address.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self { Self::new(address) }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self { Self::new(address) }
}

/// A notification channel: a characteristic within a service.
///
/// # Examples
///
/// ```
/// use bleframe::link::ChannelId;
/// let channel = ChannelId::from_u128(0x180d, 0x2a37);
/// assert_eq!(
///     channel.to_string(),
///     "00000000-0000-0000-0000-00000000180d/00000000-0000-0000-0000-000000002a37"
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl ChannelId {
    /// Build a channel from its service and characteristic identifiers.
    #[must_use]
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    /// Build a channel from raw 128-bit identifiers.
    #[must_use]
    pub const fn from_u128(service: u128, characteristic: u128) -> Self {
        Self::new(Uuid::from_u128(service), Uuid::from_u128(characteristic))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Failure reported by [`RawLink::raw_send`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The peer is not connected.
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    /// The radio stack refused the packet.
    #[error("packet rejected: {reason}")]
    Rejected { reason: String },
}

/// Primitive packet transport to a connected peer.
#[async_trait]
pub trait RawLink: Send + Sync + 'static {
    /// Send one raw packet to `peer` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] when the packet could not be handed to the
    /// radio.
    async fn raw_send(&self, peer: &PeerId, channel: &ChannelId, packet: Bytes)
    -> Result<(), SendError>;

    /// Maximum bytes per raw packet for `peer`.
    fn packet_budget(&self, _peer: &PeerId) -> usize { DEFAULT_PACKET_BUDGET }
}

#[async_trait]
impl<L: RawLink + ?Sized> RawLink for Arc<L> {
    async fn raw_send(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        packet: Bytes,
    ) -> Result<(), SendError> {
        (**self).raw_send(peer, channel, packet).await
    }

    fn packet_budget(&self, peer: &PeerId) -> usize { (**self).packet_budget(peer) }
}

/// Receiver of payloads that are not part of a request exchange.
pub trait PayloadSink: Send + Sync + 'static {
    /// Called once per completed plain payload.
    fn on_payload_delivered(&self, peer: &PeerId, channel: &ChannelId, payload: Bytes);
}

/// Payload sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl PayloadSink for DiscardSink {
    fn on_payload_delivered(&self, _peer: &PeerId, _channel: &ChannelId, _payload: Bytes) {}
}

impl PayloadSink for mpsc::UnboundedSender<(PeerId, ChannelId, Bytes)> {
    fn on_payload_delivered(&self, peer: &PeerId, channel: &ChannelId, payload: Bytes) {
        let _ = self.send((peer.clone(), *channel, payload));
    }
}

/// Answers inbound requests on the peer side of a link.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to a bounded request.
    async fn on_request(&self, peer: &PeerId, channel: &ChannelId, request: Bytes) -> Bytes;

    /// Produce the response to a chunked request.
    ///
    /// Defaults to [`RequestHandler::on_request`].
    async fn on_chunked_request(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        request: Bytes,
    ) -> Bytes {
        self.on_request(peer, channel, request).await
    }
}

/// Request handler that answers every request with its own body.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn on_request(&self, _peer: &PeerId, _channel: &ChannelId, request: Bytes) -> Bytes {
        request
    }
}
