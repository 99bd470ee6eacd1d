//! Delivery driver for outbound transfers.
//!
//! [`Outbound`] allocates an index, segments the payload, opens a registry
//! slot and pushes the frames through the [`RawLink`]. Fire-and-forget
//! transfers are sent once the last frame is accepted. Paced transfers are
//! metered one frame per tick by a [`RateLimiter`] and then wait for the
//! receiver's acknowledgement.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use leaky_bucket::RateLimiter;
use tokio::{sync::oneshot, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Segmenter, TransferError, TransferEvent, TransferKey, TransferRegistry};
use crate::{
    config::DeliveryStrategy,
    frame::{AckStatus, Category},
    index::IndexAllocator,
    link::{ChannelId, PeerId, RawLink},
    metrics::{self, Direction, Outcome},
};

/// Terminal outcome of an outbound transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundOutcome {
    /// Every frame went out and, when paced, the receiver confirmed.
    Sent,
    /// The transfer was aborted.
    Failed(TransferError),
    /// The acknowledgement did not arrive in time, or the receiver reported
    /// that it gave up waiting for frames.
    TimedOut,
}

impl OutboundOutcome {
    /// Convert into a `Result`, mapping [`OutboundOutcome::TimedOut`] to
    /// [`TransferError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns the failure cause for anything but [`OutboundOutcome::Sent`].
    pub fn into_result(self) -> Result<(), TransferError> {
        match self {
            Self::Sent => Ok(()),
            Self::Failed(error) => Err(error),
            Self::TimedOut => Err(TransferError::Timeout),
        }
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool { matches!(self, Self::Sent) }
}

/// Sends payloads as chunked transfers.
pub struct Outbound {
    link: Arc<dyn RawLink>,
    registry: Arc<TransferRegistry>,
    allocator: IndexAllocator,
}

impl Outbound {
    #[must_use]
    pub fn new(link: Arc<dyn RawLink>, registry: Arc<TransferRegistry>) -> Self {
        Self {
            link,
            registry,
            allocator: IndexAllocator::default(),
        }
    }

    /// Registry the driver reports to.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransferRegistry> { &self.registry }

    /// Send `payload` to `peer` on `channel` as a transfer of `category`.
    ///
    /// The packet budget is read once, before segmenting. Emits exactly one
    /// terminal event followed by [`TransferEvent::Finished`].
    pub async fn send(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        category: Category,
        payload: &[u8],
    ) -> OutboundOutcome {
        let key = TransferKey::new(
            peer.clone(),
            *channel,
            category,
            self.allocator.next(category),
        );
        let config = *self.registry.config();

        let frames = match Segmenter::new(self.link.packet_budget(peer), config.max_payload_size)
            .and_then(|segmenter| segmenter.segment(key.index, category.tag(), payload))
        {
            Ok(frames) => frames,
            Err(error) => return self.conclude(key, OutboundOutcome::Failed(error)),
        };
        debug!(%key, len = payload.len(), frames = frames.len(), "outbound transfer opened");

        let ticket = self
            .registry
            .begin_outbound(key.clone(), config.delivery.expects_ack());
        let in_flight = InFlight {
            outbound: self,
            key: key.clone(),
            generation: ticket.generation,
            armed: true,
        };
        let outcome = match config.delivery {
            DeliveryStrategy::FireAndForget => {
                match self.push_frames(&key, frames, None, &ticket.cancel).await {
                    Ok(()) => OutboundOutcome::Sent,
                    Err(error) => OutboundOutcome::Failed(error),
                }
            }
            DeliveryStrategy::Paced { tick, ack_timeout } => {
                let limiter = pacer(tick);
                match self
                    .push_frames(&key, frames, limiter.as_ref(), &ticket.cancel)
                    .await
                {
                    Ok(()) => await_ack(ticket.ack, ack_timeout, &ticket.cancel).await,
                    Err(error) => OutboundOutcome::Failed(error),
                }
            }
        };
        in_flight.settle(outcome)
    }

    async fn push_frames(
        &self,
        key: &TransferKey,
        frames: Vec<Bytes>,
        limiter: Option<&RateLimiter>,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        for frame in frames {
            if let Some(limiter) = limiter {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(TransferError::Disposed),
                    () = limiter.acquire_one() => {}
                }
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransferError::Disposed),
                sent = self.link.raw_send(&key.peer, &key.channel, frame) => sent?,
            }
            metrics::inc_frames(Direction::Outbound);
        }
        Ok(())
    }

    fn conclude(&self, key: TransferKey, outcome: OutboundOutcome) -> OutboundOutcome {
        let event = match &outcome {
            OutboundOutcome::Sent => {
                debug!(%key, "outbound transfer sent");
                metrics::inc_transfers(Direction::Outbound, Outcome::Sent);
                TransferEvent::Sent { key: key.clone() }
            }
            OutboundOutcome::Failed(error) => {
                warn!(%key, %error, "outbound transfer failed");
                metrics::inc_transfers(Direction::Outbound, Outcome::Failed);
                metrics::inc_errors();
                TransferEvent::Failed {
                    key: key.clone(),
                    error: error.clone(),
                    partial: Bytes::new(),
                }
            }
            OutboundOutcome::TimedOut => {
                warn!(%key, "outbound transfer timed out");
                metrics::inc_transfers(Direction::Outbound, Outcome::TimedOut);
                TransferEvent::TimedOut {
                    key: key.clone(),
                    partial: Bytes::new(),
                }
            }
        };
        self.registry.emit(event);
        self.registry.emit(TransferEvent::Finished { key });
        outcome
    }
}

/// Registry slot held by a running [`Outbound::send`].
///
/// Dropping it unsettled, as happens when the sending future is cancelled,
/// releases the slot and reports the transfer as
/// [`TransferError::Closed`].
struct InFlight<'a> {
    outbound: &'a Outbound,
    key: TransferKey,
    generation: u64,
    armed: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: OutboundOutcome) -> OutboundOutcome {
        self.armed = false;
        self.outbound
            .registry
            .finish_outbound(&self.key, self.generation);
        self.outbound.conclude(self.key.clone(), outcome)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(key = %self.key, "outbound transfer abandoned");
        self.outbound
            .registry
            .finish_outbound(&self.key, self.generation);
        self.outbound.conclude(
            self.key.clone(),
            OutboundOutcome::Failed(TransferError::Closed),
        );
    }
}

fn pacer(tick: Duration) -> Option<RateLimiter> {
    if tick.is_zero() {
        return None;
    }
    Some(
        RateLimiter::builder()
            .initial(1)
            .refill(1)
            .max(1)
            .interval(tick)
            .build(),
    )
}

async fn await_ack(
    ack: Option<oneshot::Receiver<AckStatus>>,
    ack_timeout: Duration,
    cancel: &CancellationToken,
) -> OutboundOutcome {
    let Some(ack) = ack else {
        return OutboundOutcome::Sent;
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => OutboundOutcome::Failed(TransferError::Disposed),
        answer = time::timeout(ack_timeout, ack) => match answer {
            Err(_) => OutboundOutcome::TimedOut,
            Ok(Err(_)) => OutboundOutcome::Failed(TransferError::Closed),
            Ok(Ok(AckStatus::Received)) => OutboundOutcome::Sent,
            Ok(Ok(AckStatus::Failed)) => OutboundOutcome::Failed(TransferError::RemoteRejected),
            Ok(Ok(AckStatus::TimedOut)) => OutboundOutcome::TimedOut,
        },
    }
}
