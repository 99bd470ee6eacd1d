//! Splits outbound payloads into budget-sized frames.
//!
//! [`Segmenter`] is pure: it turns a payload into the exact list of raw
//! packets that will go on the wire and leaves delivery to the
//! [`Outbound`](super::Outbound) driver.

use bytes::Bytes;

use super::TransferError;
use crate::{
    frame::{CONTINUATION_LEN, CategoryTag, HEADER_LEN, codec},
    index::TransferIndex,
};

/// Smallest packet budget able to carry a header and one payload byte.
pub const MIN_PACKET_BUDGET: usize = HEADER_LEN + 1;

/// Number of frames needed to carry `len` bytes in packets of `budget` bytes.
///
/// `budget` must be at least [`MIN_PACKET_BUDGET`].
///
/// # Examples
///
/// ```
/// use bleframe::transfer::frame_count;
/// assert_eq!(frame_count(0, 20), 1);
/// assert_eq!(frame_count(9, 20), 1);
/// assert_eq!(frame_count(10, 20), 2);
/// assert_eq!(frame_count(24, 20), 2);
/// assert_eq!(frame_count(25, 20), 3);
/// ```
#[must_use]
pub fn frame_count(len: usize, budget: usize) -> usize {
    let head_room = budget.saturating_sub(HEADER_LEN);
    let tail_room = budget.saturating_sub(CONTINUATION_LEN).max(1);
    1 + len.saturating_sub(head_room).div_ceil(tail_room)
}

/// Frame builder bound to one packet budget.
#[derive(Clone, Copy, Debug)]
pub struct Segmenter {
    budget: usize,
    max_payload_size: usize,
}

impl Segmenter {
    /// Create a segmenter for packets of `budget` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::BudgetTooSmall`] when `budget` is below
    /// [`MIN_PACKET_BUDGET`].
    pub fn new(budget: usize, max_payload_size: usize) -> Result<Self, TransferError> {
        if budget < MIN_PACKET_BUDGET {
            return Err(TransferError::BudgetTooSmall {
                budget,
                min: MIN_PACKET_BUDGET,
            });
        }
        Ok(Self {
            budget,
            max_payload_size,
        })
    }

    /// Packet budget this segmenter fills.
    #[must_use]
    pub const fn budget(&self) -> usize { self.budget }

    /// Build every frame of a transfer, header first.
    ///
    /// Frames are produced in two passes: the header is encoded with a
    /// placeholder count, the continuations are cut, and the real count is
    /// written back into the header. An empty payload yields a single bare
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::PayloadTooLarge`] when the payload exceeds the
    /// configured maximum or cannot be described by a 32-bit length.
    pub fn segment(
        &self,
        index: TransferIndex,
        tag: CategoryTag,
        payload: &[u8],
    ) -> Result<Vec<Bytes>, TransferError> {
        let len = payload.len();
        let too_large = || TransferError::PayloadTooLarge {
            len,
            max: self.max_payload_size.min(u32::MAX as usize),
        };
        if len > self.max_payload_size {
            return Err(too_large());
        }
        let total_length = u32::try_from(len).map_err(|_| too_large())?;

        let (first, rest) = payload.split_at(len.min(self.budget - HEADER_LEN));
        let mut header = codec::header_buf(index, tag, total_length, 0, first);

        let mut frames = Vec::with_capacity(frame_count(len, self.budget));
        frames.push(Bytes::new());
        let mut sequence: u32 = 0;
        for chunk in rest.chunks(self.budget - CONTINUATION_LEN) {
            sequence += 1;
            frames.push(codec::encode_continuation(index, sequence, chunk));
        }

        codec::patch_frame_count(&mut header, sequence + 1);
        frames[0] = header.freeze();
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::frame::{Category, decode_continuation, decode_header};

    fn segment(payload: &[u8], budget: usize) -> Vec<Bytes> {
        Segmenter::new(budget, usize::MAX)
            .expect("budget is valid")
            .segment(TransferIndex::new(3), Category::PeerWrite.tag(), payload)
            .expect("payload segments")
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    #[case(11)]
    fn budgets_below_twelve_are_rejected(#[case] budget: usize) {
        assert_eq!(
            Segmenter::new(budget, 100).map(|s| s.budget()),
            Err(TransferError::BudgetTooSmall { budget, min: 12 })
        );
    }

    #[test]
    fn empty_payload_is_a_bare_header() {
        let frames = segment(&[], 20);
        assert_eq!(frames.len(), 1);
        let header = decode_header(&frames[0]).expect("header decodes");
        assert_eq!(header.total_length, 0);
        assert_eq!(header.frame_count, 1);
        assert!(header.chunk.is_empty());
    }

    #[test]
    fn frames_fill_the_budget_and_number_from_one() {
        let payload: Vec<u8> = (0..40).collect();
        let frames = segment(&payload, 20);

        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.len() <= 20));
        assert_eq!(frames[0].len(), 20);

        let header = decode_header(&frames[0]).expect("header decodes");
        assert_eq!(header.total_length, 40);
        assert_eq!(header.frame_count, 4);
        assert_eq!(&header.chunk[..], &payload[..9]);

        let sequences: Vec<u32> = frames[1..]
            .iter()
            .map(|frame| decode_continuation(frame).expect("continuation").sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn minimum_budget_carries_one_byte_per_header() {
        let frames = segment(b"abcdefgh", MIN_PACKET_BUDGET);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 12);
        assert_eq!(&frames[1][5..], b"bcdefgh");
    }

    #[test]
    fn payloads_over_the_maximum_are_rejected() {
        let err = Segmenter::new(20, 8)
            .expect("budget is valid")
            .segment(TransferIndex::new(0), Category::PeerWrite.tag(), &[0; 9])
            .expect_err("payload exceeds maximum");
        assert_eq!(err, TransferError::PayloadTooLarge { len: 9, max: 8 });
    }

    #[rstest]
    #[case(0, 20, 1)]
    #[case(9, 20, 1)]
    #[case(10, 20, 2)]
    #[case(24, 20, 2)]
    #[case(25, 20, 3)]
    #[case(1, 12, 1)]
    #[case(2, 12, 2)]
    #[case(1000, 185, 6)]
    fn frame_count_matches_formula(#[case] len: usize, #[case] budget: usize, #[case] n: usize) {
        assert_eq!(frame_count(len, budget), n);
        assert_eq!(segment(&vec![7; len], budget).len(), n);
    }
}
