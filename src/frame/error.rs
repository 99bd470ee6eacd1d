//! Errors raised while decoding raw frames.

use thiserror::Error;

use super::{CategoryTag, FrameKind};

/// A raw buffer does not hold a well-formed frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The buffer is shorter than the fixed part of the frame.
    #[error("{kind} frame of {len} bytes is shorter than the {min}-byte minimum")]
    TooShort {
        kind: FrameKind,
        len: usize,
        min: usize,
    },
    /// A header frame carries a tag other than the one expected.
    #[error("unexpected category tag {found}, expected {expected}")]
    TagMismatch {
        expected: CategoryTag,
        found: CategoryTag,
    },
    /// A header frame declares that the transfer has no frames at all.
    #[error("header frame declares a frame count of zero")]
    ZeroFrameCount,
    /// An acknowledgement frame has the wrong length.
    #[error("acknowledgement frame must be 4 bytes, got {len}")]
    AckLength { len: usize },
    /// An acknowledgement frame carries an unknown status byte.
    #[error("unknown acknowledgement status {0}")]
    UnknownAckStatus(u8),
}
