//! Frame shapes exchanged over a raw notification channel.
//!
//! A transfer is carried by one header frame followed by zero or more
//! continuation frames. Paced transfers are additionally confirmed by a
//! short acknowledgement frame. The types here are declarative; every byte
//! offset lives in [`codec`].

pub mod codec;
pub mod error;
pub mod tag;

use bytes::Bytes;
use derive_more::Display;

pub use codec::{
    decode,
    decode_ack,
    decode_continuation,
    decode_header,
    encode_ack,
    encode_continuation,
    encode_header,
    is_header_for,
    peek_index,
};
pub use error::FormatError;
pub use tag::{Category, CategoryTag};

use crate::index::TransferIndex;

/// Fixed bytes preceding the chunk of a header frame.
pub const HEADER_LEN: usize = 11;
/// Fixed bytes preceding the chunk of a continuation frame.
pub const CONTINUATION_LEN: usize = 5;
/// Shortest buffer that can carry an index and a tag.
pub const MIN_FRAME_LEN: usize = 3;
/// Exact length of an acknowledgement frame.
pub const ACK_FRAME_LEN: usize = 4;

/// Shape a raw buffer is expected to have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum FrameKind {
    /// First frame of a transfer.
    #[display("header")]
    Header,
    /// Any later frame of a transfer.
    #[display("continuation")]
    Continuation,
}

impl FrameKind {
    /// Minimum encoded size of this kind of frame.
    #[must_use]
    pub const fn min_len(self) -> usize {
        match self {
            Self::Header => HEADER_LEN,
            Self::Continuation => CONTINUATION_LEN,
        }
    }
}

/// First frame of a transfer, declaring its size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderFrame {
    pub index: TransferIndex,
    pub tag: CategoryTag,
    pub total_length: u32,
    pub frame_count: u32,
    pub chunk: Bytes,
}

/// Later frame of a transfer, numbered from one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuationFrame {
    pub index: TransferIndex,
    pub sequence: u32,
    pub chunk: Bytes,
}

/// Either frame shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Header(HeaderFrame),
    Continuation(ContinuationFrame),
}

impl Frame {
    /// Transfer index shared by both shapes.
    #[must_use]
    pub fn index(&self) -> TransferIndex {
        match self {
            Self::Header(header) => header.index,
            Self::Continuation(continuation) => continuation.index,
        }
    }

    /// Payload bytes carried by the frame.
    #[must_use]
    pub fn chunk(&self) -> &Bytes {
        match self {
            Self::Header(header) => &header.chunk,
            Self::Continuation(continuation) => &continuation.chunk,
        }
    }
}

/// Receiver verdict reported back to a paced sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum AckStatus {
    /// The payload was reassembled.
    #[display("received")]
    Received,
    /// Reassembly failed validation.
    #[display("failed")]
    Failed,
    /// Reassembly stalled and was abandoned.
    #[display("timed out")]
    TimedOut,
}

impl AckStatus {
    /// Status byte on the wire.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Failed => 1,
            Self::TimedOut => 2,
        }
    }

    /// Parse a status byte.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnknownAckStatus`] for bytes other than 0, 1, 2.
    pub const fn from_wire(byte: u8) -> Result<Self, FormatError> {
        match byte {
            0 => Ok(Self::Received),
            1 => Ok(Self::Failed),
            2 => Ok(Self::TimedOut),
            other => Err(FormatError::UnknownAckStatus(other)),
        }
    }
}

/// Acknowledgement closing a paced transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckFrame {
    pub tag: CategoryTag,
    pub index: TransferIndex,
    pub status: AckStatus,
}
