//! In-memory link joining two sessions in one process.
//!
//! [`loopback`] returns a [`LoopbackLink`] to send through and the
//! [`LoopbackPort`] its packets come out of. Pumping a port into a session
//! delivers each packet to [`LinkSession::handle_packet`] in send order,
//! which is all the ordering guarantee a notification channel offers.
//!
//! The link can be disconnected, and can drop packets chosen by a filter, to
//! exercise failure paths without a radio.

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::trace;

use crate::{
    link::{ChannelId, PeerId, RawLink, SendError},
    session::LinkSession,
};

type Packet = (PeerId, ChannelId, Bytes);
type DropFilter = Box<dyn FnMut(&ChannelId, &Bytes) -> bool + Send>;

/// Sending half of an in-memory link.
pub struct LoopbackLink {
    tx: mpsc::UnboundedSender<Packet>,
    budget: usize,
    connected: AtomicBool,
    sent: AtomicUsize,
    filter: Mutex<Option<DropFilter>>,
}

/// Receiving half of an in-memory link.
pub struct LoopbackPort {
    rx: mpsc::UnboundedReceiver<Packet>,
}

/// Create a link whose packets carry at most `budget` bytes.
#[must_use]
pub fn loopback(budget: usize) -> (Arc<LoopbackLink>, LoopbackPort) {
    let (tx, rx) = mpsc::unbounded_channel();
    let link = LoopbackLink {
        tx,
        budget,
        connected: AtomicBool::new(true),
        sent: AtomicUsize::new(0),
        filter: Mutex::new(None),
    };
    (Arc::new(link), LoopbackPort { rx })
}

impl LoopbackLink {
    /// Make every later send fail with [`SendError::NotConnected`].
    pub fn disconnect(&self) { self.connected.store(false, Ordering::Release); }

    /// Packets accepted so far, including dropped ones.
    #[must_use]
    pub fn sent(&self) -> usize { self.sent.load(Ordering::Acquire) }

    /// Silently lose every packet for which `filter` returns `true`.
    pub fn drop_when(&self, filter: impl FnMut(&ChannelId, &Bytes) -> bool + Send + 'static) {
        if let Ok(mut slot) = self.filter.lock() {
            *slot = Some(Box::new(filter));
        }
    }
}

#[async_trait]
impl RawLink for LoopbackLink {
    async fn raw_send(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        packet: Bytes,
    ) -> Result<(), SendError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SendError::NotConnected(peer.clone()));
        }
        if packet.len() > self.budget {
            return Err(SendError::Rejected {
                reason: format!("{} bytes exceed the {}-byte budget", packet.len(), self.budget),
            });
        }
        self.sent.fetch_add(1, Ordering::AcqRel);
        let dropped = self
            .filter
            .lock()
            .ok()
            .and_then(|mut slot| slot.as_mut().map(|filter| filter(channel, &packet)))
            .unwrap_or(false);
        if dropped {
            trace!(%peer, %channel, len = packet.len(), "loopback dropped packet");
            return Ok(());
        }
        self.tx
            .send((peer.clone(), *channel, packet))
            .map_err(|_| SendError::NotConnected(peer.clone()))
    }

    fn packet_budget(&self, _peer: &PeerId) -> usize { self.budget }
}

impl LoopbackPort {
    /// Deliver every packet to `session` as coming from `from`.
    ///
    /// The task ends once the sending link is dropped.
    pub fn pump(mut self, session: LinkSession, from: PeerId) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some((_, channel, packet)) = self.rx.recv().await {
                session.handle_packet(&from, &channel, packet);
            }
        })
    }

    /// Take the next packet without delivering it.
    pub async fn recv(&mut self) -> Option<(PeerId, ChannelId, Bytes)> { self.rx.recv().await }
}
