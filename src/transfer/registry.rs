//! Concurrent map of live transfers and their lifecycle timers.
//!
//! [`TransferRegistry`] owns every in-flight transfer of a session. Inbound
//! slots hold a [`Reassembler`] guarded by a watchdog task that expires the
//! transfer once it stops making progress. Outbound slots hold the
//! cancellation token of the delivery driver and, for paced transfers, the
//! channel the acknowledgement is routed through.
//!
//! Events are emitted only after the slot's map guard has been released so
//! listeners may call back into the registry.

use std::sync::{
    Arc,
    Weak,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::oneshot,
    task::AbortHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Reassembler, TransferEvent, TransferKey, TransferListener};
use crate::{
    config::TransferConfig,
    frame::{AckStatus, Category, is_header_for, peek_index},
    link::{ChannelId, PeerId},
    metrics::{self, Direction, Outcome},
};

struct InboundSlot {
    reassembler: Reassembler,
    generation: u64,
    watchdog: AbortHandle,
}

struct OutboundSlot {
    ack: Option<oneshot::Sender<AckStatus>>,
    cancel: CancellationToken,
    generation: u64,
}

/// Handle returned by [`TransferRegistry::begin_outbound`].
#[derive(Debug)]
pub struct OutboundTicket {
    /// Fires when the transfer's peer is disposed.
    pub cancel: CancellationToken,
    /// Receives the acknowledgement of a paced transfer.
    pub ack: Option<oneshot::Receiver<AckStatus>>,
    /// Identifies this slot when releasing it.
    pub generation: u64,
}

/// Owner of every in-flight transfer of one session.
pub struct TransferRegistry {
    config: TransferConfig,
    inbound: DashMap<TransferKey, InboundSlot>,
    outbound: DashMap<TransferKey, OutboundSlot>,
    generation: AtomicU64,
    listener: Arc<dyn TransferListener>,
}

impl TransferRegistry {
    /// Create an empty registry reporting to `listener`.
    #[must_use]
    pub fn new(config: TransferConfig, listener: Arc<dyn TransferListener>) -> Arc<Self> {
        Arc::new(Self {
            config,
            inbound: DashMap::new(),
            outbound: DashMap::new(),
            generation: AtomicU64::new(0),
            listener,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TransferConfig { &self.config }

    /// Feed one raw packet belonging to an inbound transfer of `category`.
    ///
    /// A header on an unregistered key opens a transfer; any other frame on
    /// an unregistered key is discarded without events. Returns the payload
    /// when the packet completes its transfer.
    ///
    /// Must be called from within a Tokio runtime: opening a multi-frame
    /// transfer spawns its inactivity watchdog.
    pub fn ingest(
        self: &Arc<Self>,
        peer: &PeerId,
        channel: &ChannelId,
        category: Category,
        packet: &Bytes,
    ) -> Option<Bytes> {
        metrics::inc_frames(Direction::Inbound);
        let Some(index) = peek_index(packet) else {
            debug!(%peer, %channel, "discarding empty packet");
            return None;
        };
        let key = TransferKey::new(peer.clone(), *channel, category, index);
        let now = Instant::now();

        let result = match self.inbound.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                match occupied.get_mut().reassembler.accept(packet, now) {
                    Ok(None) => return None,
                    Ok(Some(payload)) => {
                        occupied.remove().watchdog.abort();
                        metrics::dec_active_transfers();
                        Ok(payload)
                    }
                    Err(error) => {
                        let mut slot = occupied.remove();
                        slot.watchdog.abort();
                        metrics::dec_active_transfers();
                        Err((error, slot.reassembler.take_partial()))
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if !is_header_for(packet, category.tag()) {
                    debug!(%key, len = packet.len(), "discarding stray frame");
                    return None;
                }
                let mut reassembler = Reassembler::new(
                    category.tag(),
                    self.config.max_payload_size,
                    self.config.reassembly_timeout,
                    now,
                );
                match reassembler.accept(packet, now) {
                    Ok(None) => {
                        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                        let watchdog =
                            self.spawn_watchdog(key.clone(), generation, reassembler.deadline());
                        vacant.insert(InboundSlot {
                            reassembler,
                            generation,
                            watchdog,
                        });
                        metrics::inc_active_transfers();
                        debug!(%key, "inbound transfer opened");
                        return None;
                    }
                    Ok(Some(payload)) => Ok(payload),
                    Err(error) => Err((error, reassembler.take_partial())),
                }
            }
        };

        match result {
            Ok(payload) => {
                debug!(%key, len = payload.len(), "inbound transfer received");
                metrics::inc_transfers(Direction::Inbound, Outcome::Received);
                self.emit(TransferEvent::Received {
                    key: key.clone(),
                    payload: payload.clone(),
                });
                self.emit(TransferEvent::Finished { key });
                Some(payload)
            }
            Err((error, partial)) => {
                warn!(%key, %error, "inbound transfer failed");
                metrics::inc_transfers(Direction::Inbound, Outcome::Failed);
                metrics::inc_errors();
                self.emit(TransferEvent::Failed {
                    key: key.clone(),
                    error,
                    partial,
                });
                self.emit(TransferEvent::Finished { key });
                None
            }
        }
    }

    /// Report whether an inbound transfer is open for `key`.
    #[must_use]
    pub fn is_receiving(&self, key: &TransferKey) -> bool { self.inbound.contains_key(key) }

    /// Number of open inbound transfers.
    #[must_use]
    pub fn inbound_len(&self) -> usize { self.inbound.len() }

    /// Number of outbound transfers in flight.
    #[must_use]
    pub fn outbound_len(&self) -> usize { self.outbound.len() }

    /// Open an outbound slot for `key`.
    ///
    /// A slot left over from an earlier transfer on the same key is replaced;
    /// its driver sees [`TransferError::Closed`](super::TransferError::Closed)
    /// if it was still waiting for an acknowledgement.
    pub fn begin_outbound(&self, key: TransferKey, expects_ack: bool) -> OutboundTicket {
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (ack_tx, ack_rx) = if expects_ack {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let previous = self.outbound.insert(
            key,
            OutboundSlot {
                ack: ack_tx,
                cancel: cancel.clone(),
                generation,
            },
        );
        if previous.is_none() {
            metrics::inc_active_transfers();
        }
        OutboundTicket {
            cancel,
            ack: ack_rx,
            generation,
        }
    }

    /// Route an acknowledgement to the outbound transfer it confirms.
    ///
    /// Returns `false` when no transfer on `key` is waiting for one.
    pub fn acknowledge(&self, key: &TransferKey, status: AckStatus) -> bool {
        let sender = self
            .outbound
            .get_mut(key)
            .and_then(|mut slot| slot.ack.take());
        match sender {
            Some(sender) => sender.send(status).is_ok(),
            None => {
                debug!(%key, %status, "acknowledgement matches no transfer");
                false
            }
        }
    }

    /// Release the outbound slot of `key` opened with `generation`.
    ///
    /// A slot that has since been replaced by a newer transfer is left alone.
    pub fn finish_outbound(&self, key: &TransferKey, generation: u64) {
        if self
            .outbound
            .remove_if(key, |_, slot| slot.generation == generation)
            .is_some()
        {
            metrics::dec_active_transfers();
        }
    }

    /// Forget every transfer involving `peer`.
    ///
    /// Inbound transfers are dropped without events. Outbound transfers are
    /// cancelled and report
    /// [`TransferError::Disposed`](super::TransferError::Disposed) through their
    /// drivers. Returns the number of transfers affected.
    pub fn drop_peer(&self, peer: &PeerId) -> usize {
        let mut inbound = 0;
        self.inbound.retain(|key, slot| {
            if key.peer == *peer {
                slot.watchdog.abort();
                inbound += 1;
                false
            } else {
                true
            }
        });
        for _ in 0..inbound {
            metrics::dec_active_transfers();
        }
        // Drivers release their own slots once they observe the cancellation.
        let mut outbound = 0;
        for slot in self.outbound.iter().filter(|slot| slot.key().peer == *peer) {
            slot.cancel.cancel();
            outbound += 1;
        }
        if inbound + outbound > 0 {
            info!(%peer, inbound, outbound, "peer transfers disposed");
        }
        inbound + outbound
    }

    pub(crate) fn emit(&self, event: TransferEvent) { self.listener.on_event(event); }

    fn spawn_watchdog(
        self: &Arc<Self>,
        key: TransferKey,
        generation: u64,
        deadline: Instant,
    ) -> AbortHandle {
        let registry = Arc::downgrade(self);
        tokio::spawn(watch(registry, key, generation, deadline)).abort_handle()
    }

    /// Expire the slot for `key` if it is still the same transfer and idle.
    ///
    /// Returns the new deadline when the transfer made progress since the
    /// watchdog last slept.
    fn expire_if_idle(&self, key: &TransferKey, generation: u64) -> Option<Instant> {
        let now = Instant::now();
        let mut pending = None;
        let removed = self.inbound.remove_if(key, |_, slot| {
            if slot.generation != generation {
                return false;
            }
            let deadline = slot.reassembler.deadline();
            if deadline > now {
                pending = Some(deadline);
                false
            } else {
                true
            }
        });
        let Some((key, mut slot)) = removed else {
            return pending;
        };
        let partial = slot.reassembler.expire();
        warn!(%key, buffered = partial.len(), "inbound transfer timed out");
        metrics::dec_active_transfers();
        metrics::inc_transfers(Direction::Inbound, Outcome::TimedOut);
        self.emit(TransferEvent::TimedOut {
            key: key.clone(),
            partial,
        });
        self.emit(TransferEvent::Finished { key });
        None
    }
}

async fn watch(
    registry: Weak<TransferRegistry>,
    key: TransferKey,
    generation: u64,
    mut deadline: Instant,
) {
    loop {
        time::sleep_until(deadline).await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        match registry.expire_if_idle(&key, generation) {
            Some(next) => deadline = next,
            None => return,
        }
    }
}

impl Drop for TransferRegistry {
    fn drop(&mut self) {
        for slot in self.inbound.iter() {
            slot.watchdog.abort();
        }
    }
}
