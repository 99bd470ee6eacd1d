//! Metric helpers for `bleframe`.
//!
//! Thin wrappers around the [`metrics`](https://docs.rs/metrics) facade. With
//! the `metrics` feature disabled every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking transfers in flight.
pub const TRANSFERS_ACTIVE: &str = "bleframe_transfers_active";
/// Name of the counter tracking raw frames.
pub const FRAMES_TOTAL: &str = "bleframe_frames_total";
/// Name of the counter tracking finished transfers.
pub const TRANSFERS_TOTAL: &str = "bleframe_transfers_total";
/// Name of the counter tracking protocol errors.
pub const ERRORS_TOTAL: &str = "bleframe_errors_total";

/// Direction of a frame or transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Received from the remote party.
    Inbound,
    /// Sent to the remote party.
    Outbound,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Terminal outcome of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Received,
    Sent,
    Failed,
    TimedOut,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Outcome::Received => "received",
            Outcome::Sent => "sent",
            Outcome::Failed => "failed",
            Outcome::TimedOut => "timed_out",
        }
    }
}

/// Record a raw frame in the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a finished transfer.
pub fn inc_transfers(direction: Direction, outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(
        TRANSFERS_TOTAL,
        "direction" => direction.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, outcome);
}

/// Record a protocol error.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Increment the in-flight transfer gauge.
pub fn inc_active_transfers() {
    #[cfg(feature = "metrics")]
    gauge!(TRANSFERS_ACTIVE).increment(1.0);
}

/// Decrement the in-flight transfer gauge.
pub fn dec_active_transfers() {
    #[cfg(feature = "metrics")]
    gauge!(TRANSFERS_ACTIVE).decrement(1.0);
}
