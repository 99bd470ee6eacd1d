//! Errors surfaced to callers awaiting a response.

use thiserror::Error;

use crate::{link::ChannelId, transfer::TransferError};

/// Reason a request produced no response.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The transfer carrying the request or its response failed.
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
    /// No response arrived within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// The peer was disposed while the request was pending.
    #[error("peer disposed")]
    Disposed,
    /// A bounded request does not fit in one packet.
    #[error("request of {len} bytes exceeds the {max}-byte packet budget")]
    PayloadTooLarge { len: usize, max: usize },
    /// Every request id is taken by a pending request.
    #[error("no free request id")]
    Exhausted,
    /// The channel is not registered for this kind of request.
    #[error("channel {channel} does not carry this kind of request")]
    NotRequestChannel { channel: ChannelId },
    /// Only the controller side issues requests.
    #[error("requests are issued by the controller only")]
    NotController,
}
