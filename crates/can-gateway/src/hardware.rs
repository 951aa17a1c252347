//! Peripheral and Board Collaborator Contract
//!
//! The gateway never touches registers. Everything it needs from the MCU
//! (bxCAN peripherals, the GMLAN bit-bang transmitter, the activity LED) is
//! reached through [`CanHardware`].

use can_protocol::{CanFrame, CanInterface};

/// Snapshot of TX mailbox 0 status (the TSR bits the gateway reads)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStatus {
    /// Mailbox can accept a new request (TME0)
    pub mailbox_empty: bool,
    /// Previous request finished, successfully or not (RQCP0)
    pub request_completed: bool,
    /// Previous request was acknowledged on the bus (TXOK0)
    pub tx_ok: bool,
    /// Previous request ended with a transmission error (TERR0)
    pub tx_error: bool,
    /// Previous request lost arbitration (ALST0)
    pub arbitration_lost: bool,
}

/// Driver primitives for the CAN peripherals and board glue.
///
/// Methods take `&self`: implementations are register blocks or other
/// interior-mutable handles, and are called from interrupt context, so none
/// of them may block.
///
/// Ordering contract for the TX mailbox: issuing [`request_tx`] also clears
/// the completion flags in hardware, so the gateway always reads
/// [`tx_status`] and calls [`acknowledge_tx`] before requesting the next
/// transmission.
///
/// [`request_tx`]: CanHardware::request_tx
/// [`tx_status`]: CanHardware::tx_status
/// [`acknowledge_tx`]: CanHardware::acknowledge_tx
pub trait CanHardware: Sync {
    /// Gate the peripheral clock and its interrupts
    fn set_enabled(&self, iface: CanInterface, enabled: bool);

    /// Program bit timing and test modes.
    ///
    /// `speed` is in units of 100 bit/s. Returns `false` when the peripheral
    /// refused the configuration (unsupported rate, init mode timeout).
    fn set_speed(&self, iface: CanInterface, speed: u32, loopback: bool, silent: bool) -> bool;

    /// Leave init mode and configure filters/interrupts
    fn init(&self, iface: CanInterface);

    /// Switch transceiver pins between native CAN and GMLAN bit-bang wiring
    fn set_bitbang_mode(&self, iface: CanInterface, enabled: bool);

    /// Abort pending transmissions and recover from an error state
    fn clear_send(&self, iface: CanInterface);

    /// Read the TX mailbox status flags
    fn tx_status(&self, iface: CanInterface) -> TxStatus;

    /// Contents of the TX mailbox (the last requested frame)
    fn tx_mailbox(&self, iface: CanInterface) -> CanFrame;

    /// Clear the request-completed flags (RQCP0 write-one-to-clear)
    fn acknowledge_tx(&self, iface: CanInterface);

    /// Load the TX mailbox and set TXRQ
    fn request_tx(&self, iface: CanInterface, frame: &CanFrame);

    /// Check if the RX FIFO holds at least one frame
    fn rx_pending(&self, iface: CanInterface) -> bool;

    /// Read the frame at the head of the RX FIFO without releasing it
    fn read_rx(&self, iface: CanInterface) -> CanFrame;

    /// Release the head of the RX FIFO (RFOM0)
    fn release_rx(&self, iface: CanInterface);

    /// Drive the bus activity indicator
    fn set_activity_indicator(&self, on: bool);

    /// Transmit on the software GMLAN bus when no peripheral hosts it
    fn bitbang_transmit(&self, frame: &CanFrame);
}
