//! Lifecycle notifications emitted by transfers.
//!
//! Every transfer that reaches the registry ends with exactly one terminal
//! event ([`TransferEvent::Received`], [`TransferEvent::Sent`],
//! [`TransferEvent::Failed`] or [`TransferEvent::TimedOut`]) followed by
//! [`TransferEvent::Finished`]. Nothing is emitted for a key after its
//! `Finished` event until the key is reused.

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{TransferError, TransferKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// An inbound payload was reassembled.
    Received { key: TransferKey, payload: Bytes },
    /// An outbound payload was delivered.
    Sent { key: TransferKey },
    /// The transfer failed. `partial` holds whatever was reassembled.
    Failed {
        key: TransferKey,
        error: TransferError,
        partial: Bytes,
    },
    /// The transfer stalled. `partial` holds whatever was reassembled.
    TimedOut { key: TransferKey, partial: Bytes },
    /// The transfer released its resources.
    Finished { key: TransferKey },
}

impl TransferEvent {
    /// Key of the transfer the event belongs to.
    #[must_use]
    pub fn key(&self) -> &TransferKey {
        match self {
            Self::Received { key, .. }
            | Self::Sent { key }
            | Self::Failed { key, .. }
            | Self::TimedOut { key, .. }
            | Self::Finished { key } => key,
        }
    }

    /// Report whether this event ends the transfer's useful life.
    #[must_use]
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Finished { .. }) }
}

/// Observer of transfer lifecycle events.
///
/// Called synchronously from the task that drove the transition, after all
/// registry locks are released.
pub trait TransferListener: Send + Sync + 'static {
    fn on_event(&self, event: TransferEvent);
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl TransferListener for NoopListener {
    fn on_event(&self, _event: TransferEvent) {}
}

impl TransferListener for mpsc::UnboundedSender<TransferEvent> {
    fn on_event(&self, event: TransferEvent) { let _ = self.send(event); }
}
