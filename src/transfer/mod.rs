//! Segmentation, reassembly and lifecycle of chunked transfers.
//!
//! Outbound payloads are cut into frames by the [`Segmenter`] and pushed to
//! the link by the [`Outbound`] driver. Inbound frames are fed into the
//! [`TransferRegistry`], which keeps one [`Reassembler`] per live
//! [`TransferKey`] and expires transfers that stall. Every transfer reports
//! its end through a [`TransferListener`].

pub mod error;
pub mod event;
pub mod key;
pub mod outbound;
pub mod reassembler;
pub mod registry;
pub mod segmenter;

pub use error::TransferError;
pub use event::{NoopListener, TransferEvent, TransferListener};
pub use key::TransferKey;
pub use outbound::{Outbound, OutboundOutcome};
pub use reassembler::{ReassemblyState, Reassembler};
pub use registry::{OutboundTicket, TransferRegistry};
pub use segmenter::{MIN_PACKET_BUDGET, Segmenter, frame_count};
