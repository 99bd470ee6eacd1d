//! Connection-scoped protocol endpoint.
//!
//! A [`LinkSession`] owns the transfer registry, the outbound driver with its
//! index counters and the request correlator for one radio link. The radio
//! stack feeds every inbound packet to [`LinkSession::handle_packet`]; the
//! session routes it by the role registered for its channel:
//!
//! - [`ChannelRole::Plain`] packets go straight to the payload sink.
//! - [`ChannelRole::BoundedRequest`] packets are single-frame requests or
//!   responses prefixed with a one-byte id.
//! - [`ChannelRole::ChunkedWrite`] and [`ChannelRole::ChunkedRequest`] packets
//!   are frames of chunked transfers, or acknowledgements of our own paced
//!   transfers. Completed payloads on a request channel are unwrapped and
//!   answered or matched; everything else reaches the payload sink.
//!
//! `LinkSession` is a cheap handle; clones share the same state.

mod builder;

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

pub use builder::LinkSessionBuilder;
use bytes::Bytes;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    config::TransferConfig,
    correlation::{
        RequestCorrelator,
        RequestError,
        RequestId,
        peek_chunked,
        unwrap_bounded,
        unwrap_chunked,
        wrap_bounded,
        wrap_chunked,
    },
    frame::{ACK_FRAME_LEN, AckStatus, Category, decode_ack, encode_ack},
    link::{ChannelId, PayloadSink, PeerId, RawLink, RequestHandler},
    metrics::{self, Direction},
    transfer::{
        Outbound,
        OutboundOutcome,
        TransferError,
        TransferEvent,
        TransferKey,
        TransferListener,
        TransferRegistry,
    },
};

/// Side of the link a session plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Issues requests and writes transfers tagged as controller writes.
    Controller,
    /// Answers requests and writes transfers tagged as peer writes.
    Peer,
}

impl Role {
    /// Category of the transfers this side sends.
    #[must_use]
    pub const fn write_category(self) -> Category {
        match self {
            Self::Controller => Category::ControllerWrite,
            Self::Peer => Category::PeerWrite,
        }
    }

    /// Category of the transfers this side receives.
    #[must_use]
    pub const fn inbound_category(self) -> Category {
        match self {
            Self::Controller => Category::PeerWrite,
            Self::Peer => Category::ControllerWrite,
        }
    }
}

/// How packets on a channel are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelRole {
    /// Opaque packets handed to the payload sink as they arrive.
    #[default]
    Plain,
    /// Single-packet requests and responses.
    BoundedRequest,
    /// Chunked transfers carrying plain payloads.
    ChunkedWrite,
    /// Chunked transfers carrying request and response envelopes.
    ChunkedRequest,
}

impl ChannelRole {
    const fn is_chunked(self) -> bool { matches!(self, Self::ChunkedWrite | Self::ChunkedRequest) }
}

struct SessionShared {
    role: Role,
    config: TransferConfig,
    link: Arc<dyn RawLink>,
    channels: HashMap<ChannelId, ChannelRole>,
    outbound: Outbound,
    correlator: RequestCorrelator,
    sink: Arc<dyn PayloadSink>,
    handler: Arc<dyn RequestHandler>,
    listener: Option<Arc<dyn TransferListener>>,
    tasks: TaskTracker,
}

/// Forwards registry events to the session without keeping it alive.
struct EventRelay(Weak<SessionShared>);

impl TransferListener for EventRelay {
    fn on_event(&self, event: TransferEvent) {
        if let Some(shared) = self.0.upgrade() {
            shared.on_transfer_event(event);
        }
    }
}

/// Protocol endpoint for one link.
#[derive(Clone)]
pub struct LinkSession(Arc<SessionShared>);

impl LinkSession {
    /// Start building a session that sends through `link`.
    #[must_use]
    pub fn builder(link: Arc<dyn RawLink>, role: Role) -> LinkSessionBuilder {
        LinkSessionBuilder::new(link, role)
    }

    #[must_use]
    pub fn role(&self) -> Role { self.0.role }

    #[must_use]
    pub fn config(&self) -> &TransferConfig { &self.0.config }

    /// Registry holding this session's live transfers.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransferRegistry> { self.0.outbound.registry() }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.0.correlator.pending_len() }

    /// Role registered for `channel`.
    #[must_use]
    pub fn channel_role(&self, channel: &ChannelId) -> ChannelRole { self.0.channel_role(channel) }

    /// Process one raw packet received from `peer` on `channel`.
    ///
    /// Packets of one peer and channel must be fed in arrival order. Must be
    /// called from within a Tokio runtime.
    pub fn handle_packet(&self, peer: &PeerId, channel: &ChannelId, packet: Bytes) {
        let shared = &self.0;
        match shared.channel_role(channel) {
            ChannelRole::Plain => {
                metrics::inc_frames(Direction::Inbound);
                shared.sink.on_payload_delivered(peer, channel, packet);
            }
            ChannelRole::BoundedRequest => shared.handle_bounded(peer, channel, packet),
            ChannelRole::ChunkedWrite | ChannelRole::ChunkedRequest => {
                if packet.len() == ACK_FRAME_LEN {
                    shared.handle_ack(peer, channel, &packet);
                    return;
                }
                let registry = shared.outbound.registry();
                if let Some(payload) =
                    registry.ingest(peer, channel, shared.role.inbound_category(), &packet)
                {
                    shared.deliver(peer, channel, payload);
                }
            }
        }
    }

    /// Send `payload` to `peer` as a chunked transfer on `channel`.
    pub async fn write_chunked(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        payload: &[u8],
    ) -> OutboundOutcome {
        let shared = &self.0;
        shared
            .outbound
            .send(peer, channel, shared.role.write_category(), payload)
            .await
    }

    /// Issue a single-packet request and wait for its response.
    ///
    /// # Errors
    ///
    /// Fails when the session is not a controller, the channel is not a
    /// bounded request channel, the envelope exceeds the packet budget, the
    /// send fails, the peer is disposed or no response arrives in time.
    pub async fn request(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        payload: &[u8],
    ) -> Result<Bytes, RequestError> {
        let shared = &self.0;
        shared.ensure_requester(channel, ChannelRole::BoundedRequest)?;
        let budget = shared.link.packet_budget(peer);
        let len = payload.len() + 1;
        if len > budget {
            return Err(RequestError::PayloadTooLarge { len, max: budget });
        }

        let pending = shared.correlator.register(peer, channel)?;
        let envelope = wrap_bounded(pending.id(), payload);
        debug!(%peer, %channel, id = %pending.id(), len, "sending bounded request");
        if let Err(error) = shared.link.raw_send(peer, channel, envelope).await {
            warn!(%peer, %channel, %error, "bounded request not sent");
            shared.correlator.cancel(pending);
            return Err(TransferError::Send(error).into());
        }
        metrics::inc_frames(Direction::Outbound);
        shared.correlator.wait(pending).await
    }

    /// Issue a chunked request and wait for its chunked response.
    ///
    /// # Errors
    ///
    /// Fails when the session is not a controller, the channel is not a
    /// chunked request channel, the request transfer fails, the response
    /// transfer fails, the peer is disposed or no response arrives in time.
    pub async fn request_chunked(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        payload: &[u8],
    ) -> Result<Bytes, RequestError> {
        let shared = &self.0;
        shared.ensure_requester(channel, ChannelRole::ChunkedRequest)?;

        let pending = shared.correlator.register(peer, channel)?;
        let body = wrap_chunked(Category::ChunkedRequest, pending.id(), payload);
        debug!(%peer, %channel, id = %pending.id(), len = body.len(), "sending chunked request");
        let outcome = shared
            .outbound
            .send(peer, channel, shared.role.write_category(), &body)
            .await;
        match outcome.into_result() {
            Ok(()) => shared.correlator.wait(pending).await,
            Err(error) => {
                shared.correlator.cancel(pending);
                Err(match error {
                    TransferError::Disposed => RequestError::Disposed,
                    other => RequestError::Transfer(other),
                })
            }
        }
    }

    /// Drop every transfer and fail every request involving `peer`.
    ///
    /// Inbound transfers vanish silently. Outbound transfers and pending
    /// requests fail with a disposal error. Call when the peer disconnects.
    pub fn dispose_peer(&self, peer: &PeerId) {
        let transfers = self.0.outbound.registry().drop_peer(peer);
        let requests = self.0.correlator.drop_peer(peer);
        info!(%peer, transfers, requests, "peer disposed");
    }

    /// Wait for spawned reply and acknowledgement tasks to finish.
    pub async fn shutdown(&self) {
        self.0.tasks.close();
        self.0.tasks.wait().await;
    }
}

impl SessionShared {
    fn channel_role(&self, channel: &ChannelId) -> ChannelRole {
        self.channels.get(channel).copied().unwrap_or_default()
    }

    fn ensure_requester(
        &self,
        channel: &ChannelId,
        expected: ChannelRole,
    ) -> Result<(), RequestError> {
        if self.role != Role::Controller {
            return Err(RequestError::NotController);
        }
        if self.channel_role(channel) != expected {
            return Err(RequestError::NotRequestChannel { channel: *channel });
        }
        Ok(())
    }

    fn handle_bounded(self: &Arc<Self>, peer: &PeerId, channel: &ChannelId, packet: Bytes) {
        metrics::inc_frames(Direction::Inbound);
        let Some((id, body)) = unwrap_bounded(&packet) else {
            debug!(%peer, %channel, "discarding empty bounded packet");
            return;
        };
        match self.role {
            Role::Controller => {
                self.correlator.resolve(peer, channel, id, body);
            }
            Role::Peer => {
                let shared = Arc::clone(self);
                let (peer, channel) = (peer.clone(), *channel);
                self.tasks.spawn(async move {
                    let response = shared.handler.on_request(&peer, &channel, body).await;
                    let envelope = wrap_bounded(id, &response);
                    match shared.link.raw_send(&peer, &channel, envelope).await {
                        Ok(()) => metrics::inc_frames(Direction::Outbound),
                        Err(error) => {
                            warn!(%peer, %channel, %id, %error, "bounded response not sent");
                        }
                    }
                });
            }
        }
    }

    fn handle_ack(&self, peer: &PeerId, channel: &ChannelId, packet: &[u8]) {
        let category = self.role.write_category();
        match decode_ack(packet) {
            Ok(ack) if ack.tag == category.ack_tag() => {
                let key = TransferKey::new(peer.clone(), *channel, category, ack.index);
                debug!(%key, status = %ack.status, "acknowledgement received");
                self.outbound.registry().acknowledge(&key, ack.status);
            }
            Ok(ack) => debug!(%peer, %channel, tag = %ack.tag, "discarding foreign acknowledgement"),
            Err(error) => {
                metrics::inc_errors();
                debug!(%peer, %channel, %error, "discarding malformed acknowledgement");
            }
        }
    }

    fn deliver(self: &Arc<Self>, peer: &PeerId, channel: &ChannelId, payload: Bytes) {
        if self.channel_role(channel) == ChannelRole::ChunkedRequest {
            match (self.role, unwrap_chunked(&payload)) {
                (Role::Peer, Some((tag, id, body))) if tag == Category::ChunkedRequest.tag() => {
                    self.answer_chunked(peer, channel, id, body);
                    return;
                }
                (Role::Controller, Some((tag, id, body)))
                    if tag == Category::ChunkedResponse.tag() =>
                {
                    self.correlator.resolve(peer, channel, id, body);
                    return;
                }
                _ => {}
            }
        }
        self.sink.on_payload_delivered(peer, channel, payload);
    }

    fn answer_chunked(
        self: &Arc<Self>,
        peer: &PeerId,
        channel: &ChannelId,
        id: RequestId,
        body: Bytes,
    ) {
        let shared = Arc::clone(self);
        let (peer, channel) = (peer.clone(), *channel);
        self.tasks.spawn(async move {
            let response = shared.handler.on_chunked_request(&peer, &channel, body).await;
            let envelope = wrap_chunked(Category::ChunkedResponse, id, &response);
            let outcome = shared
                .outbound
                .send(&peer, &channel, shared.role.write_category(), &envelope)
                .await;
            if !outcome.is_sent() {
                warn!(%peer, %channel, %id, ?outcome, "chunked response not delivered");
            }
        });
    }

    fn on_transfer_event(self: &Arc<Self>, event: TransferEvent) {
        if event.key().category == self.role.inbound_category() {
            match &event {
                TransferEvent::Received { key, .. } => self.send_ack(key, AckStatus::Received),
                TransferEvent::Failed {
                    key,
                    error,
                    partial,
                } => {
                    self.send_ack(key, AckStatus::Failed);
                    self.fail_request(key, partial, error.clone());
                }
                TransferEvent::TimedOut { key, partial } => {
                    self.send_ack(key, AckStatus::TimedOut);
                    self.fail_request(key, partial, TransferError::Timeout);
                }
                TransferEvent::Sent { .. } | TransferEvent::Finished { .. } => {}
            }
        }
        if let Some(listener) = &self.listener {
            listener.on_event(event);
        }
    }

    fn send_ack(self: &Arc<Self>, key: &TransferKey, status: AckStatus) {
        if !self.config.acknowledge_inbound || !self.channel_role(&key.channel).is_chunked() {
            return;
        }
        let ack = encode_ack(key.category.ack_tag(), key.index, status);
        let link = Arc::clone(&self.link);
        let key = key.clone();
        self.tasks.spawn(async move {
            match link.raw_send(&key.peer, &key.channel, ack).await {
                Ok(()) => debug!(%key, %status, "acknowledgement sent"),
                Err(error) => warn!(%key, %error, "acknowledgement not sent"),
            }
        });
    }

    /// Fail the request whose response transfer broke, if its envelope
    /// prefix made it through.
    fn fail_request(&self, key: &TransferKey, partial: &[u8], error: TransferError) {
        if self.role != Role::Controller
            || self.channel_role(&key.channel) != ChannelRole::ChunkedRequest
        {
            return;
        }
        match peek_chunked(partial) {
            Some((tag, id)) if tag == Category::ChunkedResponse.tag() => {
                self.correlator
                    .fail(&key.peer, &key.channel, id, RequestError::Transfer(error));
            }
            _ => {}
        }
    }
}
