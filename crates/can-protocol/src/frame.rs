//! CAN Frame Model

use crate::bus::BusNumber;
use crate::error::ProtocolError;
use crate::id;
use serde::{Deserialize, Serialize};

/// Bus annotation bit marking a TX-completion receipt
pub const RECEIPT_FLAG: u8 = 0x80;

/// Bus annotation bits carrying the bus number
pub const BUS_NUM_MASK: u8 = 0x7F;

/// Largest classic CAN data length code
pub const MAX_DLC: u8 = 8;

/// A classic CAN frame as it moves through the gateway queues.
///
/// `bus` is the raw bus annotation: on ingest it holds the source bus, on a
/// receipt it holds the origin bus OR'd with [`RECEIPT_FLAG`]. Frames handed
/// to the gateway for transmission have it cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// 11 or 29 bit identifier
    pub id: u32,
    /// 29-bit identifier in use
    pub extended: bool,
    /// Remote transmission request
    pub rtr: bool,
    /// Transmit-request bit, set on frames queued for a TX mailbox
    pub tx_request: bool,
    /// Data length code (0-8)
    pub dlc: u8,
    /// Payload, only the first `dlc` bytes are meaningful
    pub data: [u8; 8],
    /// Bus annotation (bus number | receipt flag)
    pub bus: u8,
    /// Free-running capture timestamp from the peripheral
    pub timestamp: u16,
}

impl CanFrame {
    /// Create a data frame with an 11-bit identifier
    pub fn new_standard(id: u32, payload: &[u8]) -> Result<Self, ProtocolError> {
        if id > id::STANDARD_MAX {
            return Err(ProtocolError::InvalidId { id, bits: 11 });
        }
        Self::with_payload(id, false, payload)
    }

    /// Create a data frame with a 29-bit identifier
    pub fn new_extended(id: u32, payload: &[u8]) -> Result<Self, ProtocolError> {
        if id > id::EXTENDED_MAX {
            return Err(ProtocolError::InvalidId { id, bits: 29 });
        }
        Self::with_payload(id, true, payload)
    }

    fn with_payload(id: u32, extended: bool, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_DLC as usize {
            return Err(ProtocolError::InvalidDlc(
                u8::try_from(payload.len()).unwrap_or(u8::MAX),
            ));
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            extended,
            dlc: payload.len() as u8,
            data,
            ..Default::default()
        })
    }

    /// Meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc.min(MAX_DLC) as usize]
    }

    /// Bus number carried in the annotation, without the receipt flag
    pub fn source_bus(&self) -> u8 {
        self.bus & BUS_NUM_MASK
    }

    /// Check if this frame confirms a completed transmission
    pub fn is_receipt(&self) -> bool {
        self.bus & RECEIPT_FLAG != 0
    }

    /// Stamp the annotation with the bus a frame arrived on
    pub fn with_bus(mut self, bus: BusNumber) -> Self {
        self.bus = bus.get();
        self
    }

    /// Turn a transmitted frame into the receipt reported to the host
    pub fn as_receipt(mut self, bus: BusNumber) -> Self {
        self.bus = bus.get() | RECEIPT_FLAG;
        self.tx_request = false;
        self
    }

    /// Copy of this frame flagged for transmission
    pub fn as_tx_request(mut self) -> Self {
        self.tx_request = true;
        self
    }

    /// Drop the bus annotation and timestamp, keeping the DLC
    pub fn clear_bus_annotation(&mut self) {
        self.bus = 0;
        self.timestamp = 0;
    }

    /// Compare identifier, flags and payload, ignoring annotation and timing
    pub fn same_content(&self, other: &CanFrame) -> bool {
        self.id == other.id
            && self.extended == other.extended
            && self.rtr == other.rtr
            && self.dlc == other.dlc
            && self.payload() == other.payload()
    }
}
