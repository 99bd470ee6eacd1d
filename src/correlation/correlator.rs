//! Pending request table.
//!
//! [`RequestCorrelator`] issues request ids and parks one completion channel
//! per pending request, keyed by peer, channel and id. Ids roll over after
//! 255 and skip any id still pending on the same peer and channel. The
//! response timer starts when the id is issued, so time spent sending the
//! request counts against it. Dropping a [`PendingReply`] withdraws its
//! request.

use std::{
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::oneshot,
    time::{self, Instant},
};
use tracing::debug;

use super::{RequestError, RequestId};
use crate::link::{ChannelId, PeerId};

type PendingKey = (PeerId, ChannelId, RequestId);
type Reply = Result<Bytes, RequestError>;
type PendingTable = DashMap<PendingKey, PendingRequest>;

#[derive(Debug)]
struct PendingRequest {
    issued_at: Instant,
    serial: u64,
    reply: oneshot::Sender<Reply>,
}

/// Ticket held by the caller while its request is outstanding.
#[derive(Debug)]
#[must_use = "a pending request must be awaited or cancelled"]
pub struct PendingReply {
    key: PendingKey,
    serial: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Reply>,
    table: Weak<PendingTable>,
}

impl PendingReply {
    /// Id to place in the request envelope.
    pub fn id(&self) -> RequestId { self.key.2 }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        // The id may already belong to a newer request.
        if table
            .remove_if(&self.key, |_, request| request.serial == self.serial)
            .is_some()
        {
            let (peer, channel, id) = &self.key;
            debug!(%peer, %channel, %id, "request withdrawn");
        }
    }
}

/// Matches responses to the requests that caused them.
#[derive(Debug)]
pub struct RequestCorrelator {
    pending: Arc<PendingTable>,
    next_id: AtomicU8,
    serial: AtomicU64,
    timeout: Duration,
}

impl RequestCorrelator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU8::new(0),
            serial: AtomicU64::new(0),
            timeout,
        }
    }

    /// Reserve a request id for `peer` and `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Exhausted`] when all 256 ids are pending.
    pub fn register(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
    ) -> Result<PendingReply, RequestError> {
        for _ in 0..=u8::MAX {
            let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let key = (peer.clone(), *channel, id);
            if let Entry::Vacant(vacant) = self.pending.entry(key.clone()) {
                let issued_at = Instant::now();
                let serial = self.serial.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                vacant.insert(PendingRequest {
                    issued_at,
                    serial,
                    reply: tx,
                });
                return Ok(PendingReply {
                    key,
                    serial,
                    deadline: issued_at + self.timeout,
                    rx,
                    table: Arc::downgrade(&self.pending),
                });
            }
        }
        Err(RequestError::Exhausted)
    }

    /// Wait for the response to `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Timeout`] when the deadline passes, or the
    /// error the request was failed with.
    pub async fn wait(&self, mut pending: PendingReply) -> Result<Bytes, RequestError> {
        if let Ok(reply) = time::timeout_at(pending.deadline, &mut pending.rx).await {
            reply.unwrap_or(Err(RequestError::Disposed))
        } else {
            self.withdraw(&pending);
            let (peer, channel, id) = &pending.key;
            debug!(%peer, %channel, %id, "request timed out");
            Err(RequestError::Timeout)
        }
    }

    /// Withdraw a request that will never be answered.
    pub fn cancel(&self, pending: PendingReply) { self.withdraw(&pending); }

    fn withdraw(&self, pending: &PendingReply) {
        self.pending
            .remove_if(&pending.key, |_, request| request.serial == pending.serial);
    }

    /// Complete the request `id` with `payload`.
    ///
    /// Returns `false` when no such request is pending.
    pub fn resolve(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        id: RequestId,
        payload: Bytes,
    ) -> bool {
        self.complete(peer, channel, id, Ok(payload))
    }

    /// Fail the request `id` with `error`.
    ///
    /// Returns `false` when no such request is pending.
    pub fn fail(
        &self,
        peer: &PeerId,
        channel: &ChannelId,
        id: RequestId,
        error: RequestError,
    ) -> bool {
        self.complete(peer, channel, id, Err(error))
    }

    /// Fail every request pending on `peer` with [`RequestError::Disposed`].
    pub fn drop_peer(&self, peer: &PeerId) -> usize {
        let keys: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|entry| entry.key().0 == *peer)
            .map(|entry| entry.key().clone())
            .collect();
        for (_, channel, id) in &keys {
            self.complete(peer, channel, *id, Err(RequestError::Disposed));
        }
        keys.len()
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }

    fn complete(&self, peer: &PeerId, channel: &ChannelId, id: RequestId, reply: Reply) -> bool {
        let Some((_, request)) = self.pending.remove(&(peer.clone(), *channel, id)) else {
            debug!(%peer, %channel, %id, "response matches no pending request");
            return false;
        };
        debug!(
            %peer,
            %channel,
            %id,
            elapsed = ?request.issued_at.elapsed(),
            ok = reply.is_ok(),
            "request completed"
        );
        request.reply.send(reply).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(20);

    #[fixture]
    fn correlator() -> Arc<RequestCorrelator> { Arc::new(RequestCorrelator::new(TIMEOUT)) }

    fn peer() -> PeerId { PeerId::from("peer") }

    fn channel() -> ChannelId { ChannelId::from_u128(3, 4) }

    #[rstest]
    #[tokio::test]
    async fn response_reaches_only_its_request(correlator: Arc<RequestCorrelator>) {
        let first = correlator.register(&peer(), &channel()).expect("id available");
        let second = correlator.register(&peer(), &channel()).expect("id available");
        assert_eq!(first.id(), RequestId::new(0));
        assert_eq!(second.id(), RequestId::new(1));

        assert!(correlator.resolve(&peer(), &channel(), second.id(), Bytes::from_static(b"two")));
        assert!(!correlator.resolve(&peer(), &channel(), RequestId::new(9), Bytes::new()));

        let reply = correlator.wait(second).await.expect("second resolved");
        assert_eq!(&reply[..], b"two");
        assert_eq!(correlator.pending_len(), 1);
        correlator.cancel(first);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[rstest]
    fn same_id_on_another_channel_is_not_matched(correlator: Arc<RequestCorrelator>) {
        let pending = correlator.register(&peer(), &channel()).expect("id available");
        let other = ChannelId::from_u128(3, 5);
        assert!(!correlator.resolve(&peer(), &other, pending.id(), Bytes::new()));
        assert!(!correlator.resolve(&PeerId::from("x"), &channel(), pending.id(), Bytes::new()));
        assert_eq!(correlator.pending_len(), 1);
    }

    #[rstest]
    fn ids_skip_pending_requests_and_exhaust(correlator: Arc<RequestCorrelator>) {
        let mut held: Vec<PendingReply> = (0..256)
            .map(|_| correlator.register(&peer(), &channel()).expect("id available"))
            .collect();
        assert_eq!(
            correlator.register(&peer(), &channel()).map(|p| p.id()),
            Err(RequestError::Exhausted)
        );
        assert!(correlator.register(&PeerId::from("other"), &channel()).is_ok());

        let freed = held.swap_remove(42);
        let id = freed.id();
        correlator.cancel(freed);
        let reused = correlator.register(&peer(), &channel()).expect("freed id available");
        assert_eq!(reused.id(), id);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out(correlator: Arc<RequestCorrelator>) {
        let pending = correlator.register(&peer(), &channel()).expect("id available");
        let id = pending.id();
        let started = Instant::now();
        assert_eq!(correlator.wait(pending).await, Err(RequestError::Timeout));
        assert_eq!(started.elapsed(), TIMEOUT);
        assert!(!correlator.resolve(&peer(), &channel(), id, Bytes::new()));
    }

    #[rstest]
    #[tokio::test]
    async fn dropping_a_peer_fails_its_requests(correlator: Arc<RequestCorrelator>) {
        let mine = correlator.register(&peer(), &channel()).expect("id available");
        let theirs = correlator.register(&PeerId::from("other"), &channel()).expect("id available");
        assert_eq!(correlator.drop_peer(&peer()), 1);
        assert_eq!(correlator.wait(mine).await, Err(RequestError::Disposed));
        assert_eq!(correlator.pending_len(), 1);
        correlator.cancel(theirs);
    }

    #[rstest]
    fn dropping_a_reply_withdraws_its_request(correlator: Arc<RequestCorrelator>) {
        let pending = correlator.register(&peer(), &channel()).expect("id available");
        let id = pending.id();
        drop(pending);
        assert_eq!(correlator.pending_len(), 0);
        assert!(!correlator.resolve(&peer(), &channel(), id, Bytes::new()));
    }

    #[rstest]
    fn stale_reply_leaves_a_reused_id_alone(correlator: Arc<RequestCorrelator>) {
        let stale = correlator.register(&peer(), &channel()).expect("id available");
        assert!(correlator.resolve(&peer(), &channel(), stale.id(), Bytes::new()));
        let held: Vec<PendingReply> = (0..256)
            .map(|_| correlator.register(&peer(), &channel()).expect("id available"))
            .collect();
        assert!(held.iter().any(|pending| pending.id() == stale.id()));

        drop(stale);
        assert_eq!(correlator.pending_len(), 256);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_are_delivered_to_the_waiter(correlator: Arc<RequestCorrelator>) {
        let pending = correlator.register(&peer(), &channel()).expect("id available");
        let error = RequestError::Transfer(crate::transfer::TransferError::Timeout);
        assert!(correlator.fail(&peer(), &channel(), pending.id(), error.clone()));
        assert_eq!(correlator.wait(pending).await, Err(error));
    }
}
