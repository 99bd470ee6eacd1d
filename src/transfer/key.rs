//! Identity of a transfer.

use std::fmt;

use crate::{
    frame::Category,
    index::TransferIndex,
    link::{ChannelId, PeerId},
};

/// Peer, channel, category and index naming one live transfer.
///
/// At most one transfer per key is active at a time. Keys are reused once
/// the index counter wraps.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub peer: PeerId,
    pub channel: ChannelId,
    pub category: Category,
    pub index: TransferIndex,
}

impl TransferKey {
    #[must_use]
    pub fn new(peer: PeerId, channel: ChannelId, category: Category, index: TransferIndex) -> Self {
        Self {
            peer,
            channel,
            category,
            index,
        }
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}#{}",
            self.peer, self.channel, self.category, self.index
        )
    }
}
