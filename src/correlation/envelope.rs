//! Request and response envelopes.
//!
//! ```text
//! bounded:  [request_id:1][payload..]
//! chunked:  [inner_tag:2][request_id:1][payload..]
//! ```
//!
//! Chunked envelopes travel as the payload of an ordinary transfer; the
//! inner tag tells a request from a response.

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::{Display, From, Into};

use crate::frame::{Category, CategoryTag};

/// Length of the chunked envelope prefix.
pub const CHUNKED_PREFIX_LEN: usize = 3;

/// Rolling identifier pairing a response with its request.
///
/// # Examples
///
/// ```
/// use bleframe::correlation::RequestId;
/// let id = RequestId::new(7);
/// assert_eq!(id.get(), 7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("{_0}")]
pub struct RequestId(u8);

impl RequestId {
    #[must_use]
    pub const fn new(value: u8) -> Self { Self(value) }

    #[must_use]
    pub const fn get(self) -> u8 { self.0 }
}

/// Wrap a bounded request or response.
#[must_use]
pub fn wrap_bounded(id: RequestId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(id.get());
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a bounded envelope into its id and payload.
///
/// Returns `None` for an empty packet.
#[must_use]
pub fn unwrap_bounded(envelope: &Bytes) -> Option<(RequestId, Bytes)> {
    let id = *envelope.first()?;
    Some((RequestId::new(id), envelope.slice(1..)))
}

/// Wrap a chunked request or response body.
///
/// # Examples
///
/// ```
/// use bleframe::{
///     correlation::{RequestId, wrap_chunked},
///     frame::Category,
/// };
/// let body = wrap_chunked(Category::ChunkedRequest, RequestId::new(2), b"get");
/// assert_eq!(&body[..], &[88, 99, 2, b'g', b'e', b't']);
/// ```
#[must_use]
pub fn wrap_chunked(category: Category, id: RequestId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHUNKED_PREFIX_LEN + payload.len());
    buf.put_slice(&category.tag().bytes());
    buf.put_u8(id.get());
    buf.put_slice(payload);
    buf.freeze()
}

/// Read the prefix of a chunked envelope.
///
/// Works on partial bodies too, so a failed transfer can still be matched to
/// its request.
#[must_use]
pub fn peek_chunked(body: &[u8]) -> Option<(CategoryTag, RequestId)> {
    match body {
        [first, second, id, ..] => Some((CategoryTag::new([*first, *second]), RequestId::new(*id))),
        _ => None,
    }
}

/// Split a chunked envelope into its tag, id and payload.
#[must_use]
pub fn unwrap_chunked(body: &Bytes) -> Option<(CategoryTag, RequestId, Bytes)> {
    let (tag, id) = peek_chunked(body)?;
    Some((tag, id, body.slice(CHUNKED_PREFIX_LEN..)))
}
