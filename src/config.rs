//! Transfer configuration and deployment presets.
//!
//! Two generations of the protocol are in the field. The service-aware
//! generation sends frames back to back and waits up to twenty seconds for a
//! stalled transfer. The legacy generation paces frames, expects an
//! acknowledgement for every transfer and gives up after two seconds.

use std::time::Duration;

/// Reassembly window of the service-aware preset.
pub const SERVICE_AWARE_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(20);
/// Reassembly window of the legacy preset.
pub const LEGACY_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(2);
/// Delay between consecutive frames of a paced transfer.
pub const DEFAULT_PACING_TICK: Duration = Duration::from_millis(30);
/// Time a paced sender waits for the acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(2000);
/// Time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Largest payload accepted in either direction.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// How the frames of an outbound transfer reach the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryStrategy {
    /// Send every frame immediately; the transfer is sent once the last
    /// frame is accepted.
    #[default]
    FireAndForget,
    /// Send one frame per `tick`, then wait up to `ack_timeout` for the
    /// receiver's acknowledgement.
    Paced { tick: Duration, ack_timeout: Duration },
}

impl DeliveryStrategy {
    /// Paced delivery with the default tick and acknowledgement window.
    #[must_use]
    pub const fn paced() -> Self {
        Self::Paced {
            tick: DEFAULT_PACING_TICK,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Report whether outbound transfers wait for an acknowledgement.
    #[must_use]
    pub const fn expects_ack(self) -> bool { matches!(self, Self::Paced { .. }) }
}

/// Tunables shared by every transfer of a session.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bleframe::config::{DeliveryStrategy, TransferConfig};
///
/// let config = TransferConfig::legacy().with_request_timeout(Duration::from_secs(5));
/// assert!(config.acknowledge_inbound);
/// assert_eq!(config.delivery, DeliveryStrategy::paced());
/// assert_eq!(config.request_timeout, Duration::from_secs(5));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    /// Inactivity window after which a partial inbound transfer is dropped.
    pub reassembly_timeout: Duration,
    /// Delivery strategy for outbound transfers.
    pub delivery: DeliveryStrategy,
    /// Time a request waits for its response.
    pub request_timeout: Duration,
    /// Largest payload sent or accepted.
    pub max_payload_size: usize,
    /// Send an acknowledgement frame for every inbound transfer outcome.
    pub acknowledge_inbound: bool,
}

impl TransferConfig {
    /// Preset for service-aware peers.
    #[must_use]
    pub const fn service_aware() -> Self {
        Self {
            reassembly_timeout: SERVICE_AWARE_REASSEMBLY_TIMEOUT,
            delivery: DeliveryStrategy::FireAndForget,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            acknowledge_inbound: false,
        }
    }

    /// Preset for legacy peers expecting paced, acknowledged transfers.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            reassembly_timeout: LEGACY_REASSEMBLY_TIMEOUT,
            delivery: DeliveryStrategy::paced(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            acknowledge_inbound: true,
        }
    }

    #[must_use]
    pub fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryStrategy) -> Self {
        self.delivery = delivery;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    #[must_use]
    pub fn with_acknowledge_inbound(mut self, enabled: bool) -> Self {
        self.acknowledge_inbound = enabled;
        self
    }
}

impl Default for TransferConfig {
    fn default() -> Self { Self::service_aware() }
}
