//! Errors terminating a transfer.

use thiserror::Error;

use crate::{frame::FormatError, link::SendError};

/// Reason a transfer ended without delivering its payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// A frame could not be decoded or declared impossible values.
    #[error("malformed frame: {0}")]
    Format(#[from] FormatError),
    /// A continuation frame arrived out of order.
    #[error("expected sequence {expected}, got {found}")]
    Sequence { expected: u32, found: u32 },
    /// The reassembled length disagrees with the declared total.
    #[error("declared {declared} bytes but received {received}")]
    LengthMismatch { declared: u32, received: usize },
    /// The transfer stalled or its acknowledgement never arrived.
    #[error("transfer timed out")]
    Timeout,
    /// The link refused a frame.
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    /// The payload exceeds the configured or representable maximum.
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    /// The packet budget cannot carry a header and one payload byte.
    #[error("packet budget {budget} is below the {min}-byte minimum")]
    BudgetTooSmall { budget: usize, min: usize },
    /// The receiver acknowledged the transfer as failed.
    #[error("receiver rejected the transfer")]
    RemoteRejected,
    /// The peer was disposed while the transfer was in flight.
    #[error("peer disposed")]
    Disposed,
    /// The acknowledgement slot was closed before an answer arrived.
    #[error("transfer closed")]
    Closed,
}
