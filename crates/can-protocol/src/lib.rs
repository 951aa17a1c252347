//! CAN Gateway Protocol Definitions
//!
//! This crate defines the frame model shared by the gateway queues, the
//! logical bus / physical interface identifiers, and the 16-byte mailbox
//! record exchanged with the host over USB.

mod bus;
mod error;
mod frame;
mod mailbox;

pub use bus::{BusNumber, CanInterface, BUS_MAX, CAN_MAX};
pub use error::ProtocolError;
pub use frame::{CanFrame, BUS_NUM_MASK, MAX_DLC, RECEIPT_FLAG};
pub use mailbox::{MailboxWords, MAILBOX_SIZE};

/// Identifier limits
pub mod id {
    /// Largest 11-bit standard identifier
    pub const STANDARD_MAX: u32 = 0x7FF;
    /// Largest 29-bit extended identifier
    pub const EXTENDED_MAX: u32 = 0x1FFF_FFFF;
}
