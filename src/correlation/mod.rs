//! Request/response correlation over bounded and chunked channels.
//!
//! Bounded requests fit in one packet and carry a one-byte id. Chunked
//! requests travel as transfers whose body starts with a two-byte inner tag
//! and the id. Either way the [`RequestCorrelator`] pairs the response with
//! the caller waiting for it.

pub mod correlator;
pub mod envelope;
pub mod error;

pub use correlator::{PendingReply, RequestCorrelator};
pub use envelope::{
    CHUNKED_PREFIX_LEN,
    RequestId,
    peek_chunked,
    unwrap_bounded,
    unwrap_chunked,
    wrap_bounded,
    wrap_chunked,
};
pub use error::RequestError;
