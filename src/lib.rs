#![doc(html_root_url = "https://docs.rs/bleframe/latest")]
//! Chunked transfers and request correlation over BLE notification channels.
//!
//! A notification channel moves packets of at most a few dozen bytes. This
//! crate splits larger payloads into indexed frames, reassembles them on the
//! far side under an inactivity deadline, optionally paces and acknowledges
//! them, and pairs requests with their responses.
//!
//! The radio stack stays outside: it implements [`link::RawLink`] and feeds
//! received packets to [`session::LinkSession::handle_packet`].

pub mod config;
pub mod correlation;
pub mod frame;
pub mod index;
pub mod link;
pub mod loopback;
pub mod metrics;
pub mod session;
pub mod transfer;

pub use config::{DeliveryStrategy, TransferConfig};
pub use correlation::{RequestError, RequestId};
pub use frame::{AckStatus, Category, CategoryTag, FormatError};
pub use index::TransferIndex;
pub use link::{ChannelId, PayloadSink, PeerId, RawLink, RequestHandler, SendError};
pub use session::{ChannelRole, LinkSession, Role};
pub use transfer::{OutboundOutcome, TransferError, TransferEvent, TransferKey, TransferListener};
