//! Protocol Error Types

use thiserror::Error;

/// Errors decoding frames or identifiers from host-supplied data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Record length is not what the wire format requires
    #[error("Invalid record length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Data length code above 8
    #[error("Invalid DLC {0} (classic CAN allows 0-8)")]
    InvalidDlc(u8),

    /// Logical bus number outside 0..BUS_MAX
    #[error("Bus number {0} is out of range")]
    InvalidBus(u8),

    /// Identifier does not fit the 11 or 29 bit space
    #[error("Identifier {id:#X} does not fit a {bits}-bit frame")]
    InvalidId { id: u32, bits: u8 },

    /// Physical interface index outside the available peripherals
    #[error("Interface index {0} does not exist")]
    InvalidInterface(u8),
}
