//! Two-byte markers naming the direction and purpose of a transfer.

use std::fmt;

/// Raw two-byte tag carried in header frames and request envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CategoryTag([u8; 2]);

impl CategoryTag {
    /// Wrap raw tag bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 2]) -> Self { Self(bytes) }

    /// Return the raw tag bytes.
    #[must_use]
    pub const fn bytes(self) -> [u8; 2] { self.0 }

    /// Tag with both bytes swapped.
    #[must_use]
    pub const fn reversed(self) -> Self { Self([self.0[1], self.0[0]]) }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0[0], self.0[1])
    }
}

impl From<[u8; 2]> for CategoryTag {
    fn from(bytes: [u8; 2]) -> Self { Self(bytes) }
}

/// Direction and purpose of a chunked payload.
///
/// The write categories tag the outer header frame of a transfer and each
/// owns an index counter. The request and response categories tag the inner
/// envelope of a chunked request body. Request and response tags are
/// reverses of each other and neither is a palindrome, so a frame can never
/// be read in the wrong direction.
///
/// # Examples
///
/// ```
/// use bleframe::frame::Category;
/// assert_eq!(Category::ControllerWrite.tag().bytes(), [120, 110]);
/// assert_eq!(Category::ChunkedResponse.tag(), Category::ChunkedRequest.tag().reversed());
/// assert_eq!(Category::PeerWrite.ack_tag().bytes(), [110, 110]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Chunked write from the controller to the peer device.
    ControllerWrite,
    /// Chunked write from the peer device to the controller.
    PeerWrite,
    /// Inner envelope of a chunked request.
    ChunkedRequest,
    /// Inner envelope of a chunked response.
    ChunkedResponse,
}

impl Category {
    /// Tag bytes placed on the wire for this category.
    #[must_use]
    pub const fn tag(self) -> CategoryTag {
        match self {
            Self::ControllerWrite => CategoryTag([120, 110]),
            Self::PeerWrite => CategoryTag([110, 100]),
            Self::ChunkedRequest => CategoryTag([88, 99]),
            Self::ChunkedResponse => CategoryTag([99, 88]),
        }
    }

    /// Tag used when acknowledging a transfer of this category.
    ///
    /// The acknowledgement repeats the first tag byte, giving `[120, 120]`
    /// for controller writes and `[110, 110]` for peer writes.
    #[must_use]
    pub const fn ack_tag(self) -> CategoryTag {
        let first = self.tag().0[0];
        CategoryTag([first, first])
    }

    /// Look up the category carrying `tag`.
    #[must_use]
    pub fn from_tag(tag: CategoryTag) -> Option<Self> {
        [
            Self::ControllerWrite,
            Self::PeerWrite,
            Self::ChunkedRequest,
            Self::ChunkedResponse,
        ]
        .into_iter()
        .find(|category| category.tag() == tag)
    }

    /// Report whether this category tags whole transfers.
    #[must_use]
    pub const fn is_write(self) -> bool { matches!(self, Self::ControllerWrite | Self::PeerWrite) }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ControllerWrite => "controller-write",
            Self::PeerWrite => "peer-write",
            Self::ChunkedRequest => "chunked-request",
            Self::ChunkedResponse => "chunked-response",
        };
        f.write_str(name)
    }
}
