//! Rolling transfer identifiers.
//!
//! Every frame starts with a signed byte naming the logical transfer it
//! belongs to. [`IndexAllocator`] hands those bytes out from one rolling
//! counter per [`Category`], shared across all peers.

use std::hash::Hash;

use dashmap::DashMap;
use derive_more::{Display, From, Into};

use crate::frame::Category;

/// Signed byte identifying a transfer within its peer, channel and category.
///
/// # Examples
///
/// ```
/// use bleframe::index::TransferIndex;
/// let index = TransferIndex::new(-3);
/// assert_eq!(index.get(), -3);
/// assert_eq!(index.to_wire(), 0xFD);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct TransferIndex(i8);

impl TransferIndex {
    /// Value the counter holds before its first allocation.
    pub const SENTINEL: Self = Self(i8::MIN);

    /// Wrap a raw index.
    #[must_use]
    pub const fn new(value: i8) -> Self { Self(value) }

    /// Return the signed value.
    #[must_use]
    pub const fn get(self) -> i8 { self.0 }

    /// Return the byte as it appears on the wire.
    #[must_use]
    pub const fn to_wire(self) -> u8 { self.0.to_ne_bytes()[0] }

    /// Interpret a wire byte as an index.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Self { Self(i8::from_ne_bytes([byte])) }

    /// Return the index issued after this one.
    ///
    /// `127` is never issued: the counter wraps from `126` through `127`
    /// straight back to `-128`.
    #[must_use]
    pub const fn successor(self) -> Self {
        match self.0.wrapping_add(1) {
            i8::MAX => Self(i8::MIN),
            next => Self(next),
        }
    }
}

/// Issues [`TransferIndex`] values from one counter per key.
///
/// The allocator never checks whether an index is still in use. A collision
/// needs 255 simultaneously open transfers in one category, which the
/// transfer lifetimes rule out in practice.
///
/// # Examples
///
/// ```
/// use bleframe::{frame::Category, index::IndexAllocator};
/// let allocator = IndexAllocator::default();
/// assert_eq!(allocator.next(Category::PeerWrite).get(), -127);
/// assert_eq!(allocator.next(Category::PeerWrite).get(), -126);
/// assert_eq!(allocator.next(Category::ControllerWrite).get(), -127);
/// ```
#[derive(Debug)]
pub struct IndexAllocator<K = Category>
where
    K: Eq + Hash,
{
    counters: DashMap<K, TransferIndex>,
}

impl<K: Eq + Hash> Default for IndexAllocator<K> {
    fn default() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash> IndexAllocator<K> {
    /// Advance the counter for `category` and return the new index.
    pub fn next(&self, category: K) -> TransferIndex {
        let mut slot = self
            .counters
            .entry(category)
            .or_insert(TransferIndex::SENTINEL);
        let issued = slot.successor();
        *slot = issued;
        issued
    }

    /// Return the most recently issued index for `category`, if any.
    #[must_use]
    pub fn last(&self, category: &K) -> Option<TransferIndex> {
        self.counters.get(category).map(|slot| *slot)
    }
}
