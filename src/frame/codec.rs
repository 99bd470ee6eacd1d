//! Byte-exact encoding and decoding of frames.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! header:        [index:1][tag:2][total_length:4][frame_count:4][chunk..]
//! continuation:  [index:1][sequence:4][chunk..]
//! ack:           [ack_tag:2][index:1][status:1]
//! ```
//!
//! Decoded chunks are zero-copy slices of the input buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    ACK_FRAME_LEN,
    AckFrame,
    AckStatus,
    CategoryTag,
    ContinuationFrame,
    FormatError,
    Frame,
    FrameKind,
    HEADER_LEN,
    HeaderFrame,
    MIN_FRAME_LEN,
};
use crate::index::TransferIndex;

const TAG_RANGE: std::ops::Range<usize> = 1..MIN_FRAME_LEN;
const FRAME_COUNT_RANGE: std::ops::Range<usize> = 7..HEADER_LEN;

/// Encode a header frame.
///
/// # Examples
///
/// ```
/// use bleframe::{
///     frame::{Category, encode_header},
///     index::TransferIndex,
/// };
/// let frame = encode_header(TransferIndex::new(1), Category::ControllerWrite.tag(), 3, 1, b"abc");
/// assert_eq!(&frame[..], &[1, 120, 110, 0, 0, 0, 3, 0, 0, 0, 1, b'a', b'b', b'c']);
/// ```
#[must_use]
pub fn encode_header(
    index: TransferIndex,
    tag: CategoryTag,
    total_length: u32,
    frame_count: u32,
    chunk: &[u8],
) -> Bytes {
    header_buf(index, tag, total_length, frame_count, chunk).freeze()
}

/// Encode a continuation frame.
#[must_use]
pub fn encode_continuation(index: TransferIndex, sequence: u32, chunk: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FrameKind::Continuation.min_len() + chunk.len());
    buf.put_i8(index.get());
    buf.put_u32(sequence);
    buf.put_slice(chunk);
    buf.freeze()
}

/// Encode an acknowledgement frame.
#[must_use]
pub fn encode_ack(tag: CategoryTag, index: TransferIndex, status: AckStatus) -> Bytes {
    let mut buf = BytesMut::with_capacity(ACK_FRAME_LEN);
    buf.put_slice(&tag.bytes());
    buf.put_i8(index.get());
    buf.put_u8(status.to_wire());
    buf.freeze()
}

pub(crate) fn header_buf(
    index: TransferIndex,
    tag: CategoryTag,
    total_length: u32,
    frame_count: u32,
    chunk: &[u8],
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len());
    buf.put_i8(index.get());
    buf.put_slice(&tag.bytes());
    buf.put_u32(total_length);
    buf.put_u32(frame_count);
    buf.put_slice(chunk);
    buf
}

/// Overwrite the frame count of an encoded header in place.
pub(crate) fn patch_frame_count(header: &mut BytesMut, frame_count: u32) {
    if let Some(field) = header.get_mut(FRAME_COUNT_RANGE) {
        field.copy_from_slice(&frame_count.to_be_bytes());
    }
}

/// Decode `packet` as the given kind of frame.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] when the buffer cannot hold the fixed
/// part of the frame.
pub fn decode(packet: &Bytes, kind: FrameKind) -> Result<Frame, FormatError> {
    match kind {
        FrameKind::Header => decode_header(packet).map(Frame::Header),
        FrameKind::Continuation => decode_continuation(packet).map(Frame::Continuation),
    }
}

/// Decode a header frame.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] for buffers under eleven bytes.
pub fn decode_header(packet: &Bytes) -> Result<HeaderFrame, FormatError> {
    let mut fields = fixed_part(packet, FrameKind::Header)?;
    let index = TransferIndex::new(fields.get_i8());
    let tag = CategoryTag::new([fields.get_u8(), fields.get_u8()]);
    let total_length = fields.get_u32();
    let frame_count = fields.get_u32();
    Ok(HeaderFrame {
        index,
        tag,
        total_length,
        frame_count,
        chunk: packet.slice(HEADER_LEN..),
    })
}

/// Decode a continuation frame.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] for buffers under five bytes.
pub fn decode_continuation(packet: &Bytes) -> Result<ContinuationFrame, FormatError> {
    let mut fields = fixed_part(packet, FrameKind::Continuation)?;
    let index = TransferIndex::new(fields.get_i8());
    let sequence = fields.get_u32();
    Ok(ContinuationFrame {
        index,
        sequence,
        chunk: packet.slice(FrameKind::Continuation.min_len()..),
    })
}

/// Decode an acknowledgement frame.
///
/// # Errors
///
/// Returns [`FormatError::AckLength`] unless the buffer is exactly four
/// bytes, or [`FormatError::UnknownAckStatus`] for an unknown status byte.
pub fn decode_ack(packet: &[u8]) -> Result<AckFrame, FormatError> {
    let [first, second, index, status] = packet else {
        return Err(FormatError::AckLength { len: packet.len() });
    };
    Ok(AckFrame {
        tag: CategoryTag::new([*first, *second]),
        index: TransferIndex::from_wire(*index),
        status: AckStatus::from_wire(*status)?,
    })
}

/// Read the transfer index of any frame.
#[must_use]
pub fn peek_index(packet: &[u8]) -> Option<TransferIndex> {
    packet.first().copied().map(TransferIndex::from_wire)
}

/// Report whether `packet` is a complete header frame tagged with `tag`.
#[must_use]
pub fn is_header_for(packet: &[u8], tag: CategoryTag) -> bool {
    packet.len() >= HEADER_LEN && packet.get(TAG_RANGE) == Some(&tag.bytes()[..])
}

fn fixed_part(packet: &[u8], kind: FrameKind) -> Result<&[u8], FormatError> {
    let min = kind.min_len();
    packet.get(..min).ok_or(FormatError::TooShort {
        kind,
        len: packet.len(),
        min,
    })
}
