//! Gateway Error Types

use can_protocol::CanInterface;
use thiserror::Error;

/// Errors reported by configuration-time gateway operations.
///
/// Interrupt-time paths (TX drain, RX ingest, submit) never return these;
/// they report through counters and [`SubmitOutcome`](crate::SubmitOutcome).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Peripheral rejected the speed/mode configuration; interface left inert
    #[error("{interface} rejected speed {speed} (x100 bit/s) on bus {bus}")]
    SpeedConfig {
        interface: CanInterface,
        bus: u8,
        speed: u32,
    },

    /// One or more interfaces failed to initialise
    #[error("Interface init failed on {failed:?}")]
    InitFailed { failed: Vec<CanInterface> },

    /// GMLAN can only be hosted on CAN2 or CAN3
    #[error("GMLAN can only be set on CAN2 or CAN3 (got interface {0})")]
    InvalidGmlanTarget(u8),

    /// Bus number outside 0..BUS_MAX
    #[error("Bus number {0} is out of range")]
    BusOutOfRange(u8),

    /// Queue could not be allocated
    #[error("Queue allocation failed: {0}")]
    Queue(#[from] can_ring::RingError),

    /// Configuration values failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration source could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
