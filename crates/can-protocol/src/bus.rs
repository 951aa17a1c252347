//! Logical Bus Numbers and Physical Interfaces
//!
//! A *bus number* is what the host sees (0..BUS_MAX). An *interface* is one
//! of the MCU's CAN peripherals. They coincide by default, but an interface
//! can be lent to the software GMLAN bus, in which case it answers to
//! [`BusNumber::GMLAN`] instead of its native number.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of logical buses exposed to the host
pub const BUS_MAX: usize = 4;

/// Number of physical CAN peripherals
pub const CAN_MAX: usize = 3;

/// Validated logical bus number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusNumber(u8);

impl BusNumber {
    /// Bus served by CAN1 by default
    pub const BUS0: BusNumber = BusNumber(0);
    /// Bus served by CAN2 by default
    pub const BUS1: BusNumber = BusNumber(1);
    /// Bus served by CAN3 by default
    pub const BUS2: BusNumber = BusNumber(2);
    /// Software GMLAN bus, hosted on a borrowed interface or bit-banged
    pub const GMLAN: BusNumber = BusNumber(3);

    /// All logical buses in ascending order
    pub const ALL: [BusNumber; BUS_MAX] = [Self::BUS0, Self::BUS1, Self::BUS2, Self::GMLAN];

    /// Create a bus number, returning `None` when out of range
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < BUS_MAX {
            Some(BusNumber(raw))
        } else {
            None
        }
    }

    /// Raw bus number
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Table index for per-bus arrays
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the GMLAN slot
    pub const fn is_gmlan(self) -> bool {
        self.0 == Self::GMLAN.0
    }
}

impl TryFrom<u8> for BusNumber {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        BusNumber::new(raw).ok_or(ProtocolError::InvalidBus(raw))
    }
}

impl From<BusNumber> for u8 {
    fn from(bus: BusNumber) -> u8 {
        bus.0
    }
}

impl fmt::Display for BusNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus {}", self.0)
    }
}

/// Physical CAN peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CanInterface {
    /// First peripheral, always bus 0
    Can1 = 0,
    /// Second peripheral, bus 1 or GMLAN
    Can2 = 1,
    /// Third peripheral, bus 2 or GMLAN
    Can3 = 2,
}

impl CanInterface {
    /// All interfaces in ascending order
    pub const ALL: [CanInterface; CAN_MAX] = [Self::Can1, Self::Can2, Self::Can3];

    /// Look up an interface by its peripheral index
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(CanInterface::Can1),
            1 => Some(CanInterface::Can2),
            2 => Some(CanInterface::Can3),
            _ => None,
        }
    }

    /// Peripheral index (0 = CAN1)
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Peripheral name for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            CanInterface::Can1 => "CAN1",
            CanInterface::Can2 => "CAN2",
            CanInterface::Can3 => "CAN3",
        }
    }

    /// Bus number this interface serves when not lent to GMLAN
    pub const fn native_bus(self) -> BusNumber {
        BusNumber(self as u8)
    }

    /// Only the secondary peripherals can be switched to GMLAN
    pub const fn is_gmlan_capable(self) -> bool {
        matches!(self, CanInterface::Can2 | CanInterface::Can3)
    }

    /// Bit for this interface in a per-interface mask (silent mode)
    pub const fn mask_bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl TryFrom<u8> for CanInterface {
    type Error = ProtocolError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        CanInterface::from_index(index).ok_or(ProtocolError::InvalidInterface(index))
    }
}

impl fmt::Display for CanInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_number_bounds() {
        assert_eq!(BusNumber::new(3), Some(BusNumber::GMLAN));
        assert_eq!(BusNumber::new(4), None);
        assert_eq!(BusNumber::try_from(200), Err(ProtocolError::InvalidBus(200)));
        assert!(BusNumber::GMLAN.is_gmlan());
        assert!(!BusNumber::BUS2.is_gmlan());
    }

    #[test]
    fn test_interface_native_bus() {
        for iface in CanInterface::ALL {
            assert_eq!(iface.native_bus().index(), iface.index());
        }
        assert_eq!(CanInterface::from_index(3), None);
    }

    #[test]
    fn test_gmlan_capability() {
        assert!(!CanInterface::Can1.is_gmlan_capable());
        assert!(CanInterface::Can2.is_gmlan_capable());
        assert!(CanInterface::Can3.is_gmlan_capable());
    }

    #[test]
    fn test_serde_representation() {
        let bus: BusNumber = serde_json::from_str("2").unwrap();
        assert_eq!(bus, BusNumber::BUS2);
        assert!(serde_json::from_str::<BusNumber>("7").is_err());

        let iface: CanInterface = serde_json::from_str("\"can3\"").unwrap();
        assert_eq!(iface, CanInterface::Can3);
        assert_eq!(serde_json::to_string(&CanInterface::Can2).unwrap(), "\"can2\"");
    }
}
