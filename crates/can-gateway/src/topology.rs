//! Bus / Interface Remapping Table
//!
//! Owns the three lookup tables that used to be loose arrays: which
//! interface serves a logical bus, which logical bus an interface answers
//! to, and the static forwarding targets. The gateway keeps one copy inside
//! a critical-section mutex; this type itself is plain data.

use can_protocol::{BusNumber, CanInterface, BUS_MAX, CAN_MAX};
use serde::Serialize;

use crate::error::GatewayError;

/// Logical bus <-> physical interface mapping plus forwarding targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusTopology {
    interface_for_bus: [Option<CanInterface>; BUS_MAX],
    bus_for_interface: [BusNumber; CAN_MAX],
    forwarding: [Option<BusNumber>; BUS_MAX],
}

impl Default for BusTopology {
    fn default() -> Self {
        Self {
            interface_for_bus: [
                Some(CanInterface::Can1),
                Some(CanInterface::Can2),
                Some(CanInterface::Can3),
                None,
            ],
            bus_for_interface: [BusNumber::BUS0, BusNumber::BUS1, BusNumber::BUS2],
            forwarding: [None; BUS_MAX],
        }
    }
}

impl BusTopology {
    /// Interface currently serving `bus`, if any
    pub fn interface_for(&self, bus: BusNumber) -> Option<CanInterface> {
        self.interface_for_bus[bus.index()]
    }

    /// Logical bus `iface` currently answers to
    pub fn bus_for(&self, iface: CanInterface) -> BusNumber {
        self.bus_for_interface[iface.index()]
    }

    /// Interface lent to the GMLAN bus, if any
    pub fn gmlan_host(&self) -> Option<CanInterface> {
        self.interface_for(BusNumber::GMLAN)
    }

    /// Static forward target for frames received on `bus`
    pub fn forward_target(&self, bus: BusNumber) -> Option<BusNumber> {
        self.forwarding[bus.index()]
    }

    /// Set or clear the static forward target for `from`
    pub fn set_forward(&mut self, from: BusNumber, to: Option<BusNumber>) {
        self.forwarding[from.index()] = to;
    }

    /// Return `iface` to its native bus, dropping any GMLAN role it held
    pub fn revert_to_native(&mut self, iface: CanInterface) {
        if self.bus_for(iface).is_gmlan() {
            self.interface_for_bus[BusNumber::GMLAN.index()] = None;
        }
        let native = iface.native_bus();
        self.bus_for_interface[iface.index()] = native;
        self.interface_for_bus[native.index()] = Some(iface);
    }

    /// Lend `iface` to the GMLAN bus.
    ///
    /// A different interface still holding the role is reverted first, so
    /// the table never has two GMLAN hosts.
    pub fn assign_gmlan(&mut self, iface: CanInterface) -> Result<(), GatewayError> {
        if !iface.is_gmlan_capable() {
            return Err(GatewayError::InvalidGmlanTarget(iface as u8));
        }
        if let Some(prev) = self.gmlan_host() {
            if prev != iface {
                self.revert_to_native(prev);
            }
        }
        self.bus_for_interface[iface.index()] = BusNumber::GMLAN;
        self.interface_for_bus[iface.native_bus().index()] = None;
        self.interface_for_bus[BusNumber::GMLAN.index()] = Some(iface);
        Ok(())
    }

    /// Check that both lookup directions agree and GMLAN has at most one host
    pub fn is_consistent(&self) -> bool {
        let gmlan_hosts = self
            .bus_for_interface
            .iter()
            .filter(|bus| bus.is_gmlan())
            .count();
        if gmlan_hosts > 1 {
            return false;
        }

        CanInterface::ALL.iter().all(|&iface| {
            let bus = self.bus_for(iface);
            self.interface_for(bus) == Some(iface)
        }) && BusNumber::ALL.iter().all(|&bus| match self.interface_for(bus) {
            Some(iface) => self.bus_for(iface) == bus,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let topology = BusTopology::default();
        assert_eq!(topology.interface_for(BusNumber::BUS0), Some(CanInterface::Can1));
        assert_eq!(topology.interface_for(BusNumber::GMLAN), None);
        assert_eq!(topology.bus_for(CanInterface::Can3), BusNumber::BUS2);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_assign_gmlan() {
        let mut topology = BusTopology::default();
        topology.assign_gmlan(CanInterface::Can3).unwrap();

        assert_eq!(topology.gmlan_host(), Some(CanInterface::Can3));
        assert_eq!(topology.bus_for(CanInterface::Can3), BusNumber::GMLAN);
        assert_eq!(topology.interface_for(BusNumber::BUS2), None);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_moving_gmlan_reverts_previous_host() {
        let mut topology = BusTopology::default();
        topology.assign_gmlan(CanInterface::Can3).unwrap();
        topology.assign_gmlan(CanInterface::Can2).unwrap();

        assert_eq!(topology.gmlan_host(), Some(CanInterface::Can2));
        assert_eq!(topology.bus_for(CanInterface::Can3), BusNumber::BUS2);
        assert_eq!(topology.interface_for(BusNumber::BUS2), Some(CanInterface::Can3));
        assert_eq!(topology.interface_for(BusNumber::BUS1), None);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_can1_cannot_host_gmlan() {
        let mut topology = BusTopology::default();
        assert!(matches!(
            topology.assign_gmlan(CanInterface::Can1),
            Err(GatewayError::InvalidGmlanTarget(0))
        ));
        assert_eq!(topology, BusTopology::default());
    }

    #[test]
    fn test_revert_restores_default() {
        let mut topology = BusTopology::default();
        topology.assign_gmlan(CanInterface::Can2).unwrap();
        topology.revert_to_native(CanInterface::Can2);
        assert_eq!(topology, BusTopology::default());
    }

    #[test]
    fn test_forwarding_table() {
        let mut topology = BusTopology::default();
        topology.set_forward(BusNumber::BUS0, Some(BusNumber::BUS2));
        assert_eq!(topology.forward_target(BusNumber::BUS0), Some(BusNumber::BUS2));
        assert_eq!(topology.forward_target(BusNumber::BUS2), None);

        topology.set_forward(BusNumber::BUS0, None);
        assert_eq!(topology.forward_target(BusNumber::BUS0), None);
    }
}
