//! Inbound state machine stitching frames back into one payload.
//!
//! A [`Reassembler`] tracks a single transfer. It moves from
//! [`ReassemblyState::AwaitingHeader`] to [`ReassemblyState::Receiving`] on a
//! valid header and ends in exactly one of the terminal states. It never
//! looks at the clock itself: callers pass `now` so the registry can drive
//! expiry from its own timers and tests stay deterministic.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use super::TransferError;
use crate::frame::{CategoryTag, FormatError, decode_continuation, decode_header};

/// Position of a [`Reassembler`] in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblyState {
    AwaitingHeader,
    Receiving,
    Completed,
    Failed,
    TimedOut,
}

impl ReassemblyState {
    /// Report whether the transfer has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Reassembles the frames of one inbound transfer.
#[derive(Debug)]
pub struct Reassembler {
    expected_tag: CategoryTag,
    max_payload_size: usize,
    timeout: Duration,
    state: ReassemblyState,
    declared_length: u32,
    frame_count: u32,
    accepted: u32,
    buffer: BytesMut,
    last_activity: Instant,
}

impl Reassembler {
    /// Create a reassembler waiting for a header tagged `expected_tag`.
    #[must_use]
    pub fn new(
        expected_tag: CategoryTag,
        max_payload_size: usize,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            expected_tag,
            max_payload_size,
            timeout,
            state: ReassemblyState::AwaitingHeader,
            declared_length: 0,
            frame_count: 0,
            accepted: 0,
            buffer: BytesMut::new(),
            last_activity: now,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ReassemblyState { self.state }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffer.len() }

    #[cfg(test)]
    pub(crate) fn buffer_capacity(&self) -> usize { self.buffer.capacity() }

    /// Instant after which the transfer counts as stalled.
    #[must_use]
    pub fn deadline(&self) -> Instant { self.last_activity + self.timeout }

    /// Feed the next raw frame of the transfer.
    ///
    /// Returns `Ok(Some(payload))` when the frame completes the transfer and
    /// `Ok(None)` while more frames are expected.
    ///
    /// # Errors
    ///
    /// Any validation failure moves the reassembler to
    /// [`ReassemblyState::Failed`] and returns the cause. Frames fed after a
    /// terminal transition yield [`TransferError::Closed`].
    pub fn accept(&mut self, packet: &Bytes, now: Instant) -> Result<Option<Bytes>, TransferError> {
        let result = match self.state {
            ReassemblyState::AwaitingHeader => self.accept_header(packet),
            ReassemblyState::Receiving => self.accept_continuation(packet),
            _ => return Err(TransferError::Closed),
        };
        match result {
            Ok(()) => {
                self.last_activity = now;
                self.try_complete()
            }
            Err(err) => {
                self.state = ReassemblyState::Failed;
                Err(err)
            }
        }
    }

    /// Mark the transfer as stalled and hand back whatever arrived.
    pub fn expire(&mut self) -> Bytes {
        self.state = ReassemblyState::TimedOut;
        self.take_partial()
    }

    /// Take the bytes accumulated so far, leaving the buffer empty.
    pub fn take_partial(&mut self) -> Bytes { self.buffer.split().freeze() }

    fn accept_header(&mut self, packet: &Bytes) -> Result<(), TransferError> {
        let header = decode_header(packet)?;
        if header.tag != self.expected_tag {
            return Err(FormatError::TagMismatch {
                expected: self.expected_tag,
                found: header.tag,
            }
            .into());
        }
        if header.frame_count == 0 {
            return Err(FormatError::ZeroFrameCount.into());
        }
        let declared = header.total_length as usize;
        if declared > self.max_payload_size {
            return Err(TransferError::PayloadTooLarge {
                len: declared,
                max: self.max_payload_size,
            });
        }
        self.declared_length = header.total_length;
        self.frame_count = header.frame_count;
        self.state = ReassemblyState::Receiving;
        // Grow with the data; the declared length is untrusted until it arrives.
        self.append(&header.chunk)
    }

    fn accept_continuation(&mut self, packet: &Bytes) -> Result<(), TransferError> {
        let continuation = decode_continuation(packet)?;
        // The header is frame zero, so the next sequence equals frames taken.
        if continuation.sequence != self.accepted {
            return Err(TransferError::Sequence {
                expected: self.accepted,
                found: continuation.sequence,
            });
        }
        self.append(&continuation.chunk)
    }

    fn append(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        let received = self.buffer.len() + chunk.len();
        if received > self.declared_length as usize {
            return Err(TransferError::LengthMismatch {
                declared: self.declared_length,
                received,
            });
        }
        self.buffer.extend_from_slice(chunk);
        self.accepted += 1;
        Ok(())
    }

    fn try_complete(&mut self) -> Result<Option<Bytes>, TransferError> {
        if self.accepted < self.frame_count {
            return Ok(None);
        }
        if self.buffer.len() != self.declared_length as usize {
            self.state = ReassemblyState::Failed;
            return Err(TransferError::LengthMismatch {
                declared: self.declared_length,
                received: self.buffer.len(),
            });
        }
        self.state = ReassemblyState::Completed;
        Ok(Some(self.take_partial()))
    }
}
