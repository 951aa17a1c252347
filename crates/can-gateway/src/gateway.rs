//! CAN Gateway Engine
//!
//! Ties the queues, the remapping table and the peripherals together:
//!
//! - interface lifecycle (init, speed/mode, GMLAN reassignment)
//! - TX drain and completion receipts (TX-empty interrupt or submit kick)
//! - RX ingest with forwarding and safety hooks (RX FIFO interrupt)
//! - bus error recovery (status-change interrupt)
//! - the single transmit entry point used by the host and by forwarding
//!
//! Every method takes `&self` so one gateway can be shared by the
//! foreground loop and all interrupt handlers. Shared state is only touched
//! inside short `critical_section::with` blocks; diagnostics are logged
//! after the block ends.

use can_protocol::{BusNumber, CanFrame, CanInterface, BUS_MAX};
use can_ring::CanRing;
use core::cell::Cell;
use critical_section::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BusSettings, GatewayConfig};
use crate::counters::CanCounters;
use crate::error::GatewayError;
use crate::hardware::CanHardware;
use crate::hooks::SafetyHooks;
use crate::topology::BusTopology;

/// Slots in the unified RX queue
pub const RX_QUEUE_SLOTS: usize = 0x1000;

/// Slots in each per-bus TX queue
pub const TX_QUEUE_SLOTS: usize = 0x100;

/// What happened to a frame handed to [`CanGateway::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for a peripheral (and the peripheral kicked, if one serves the bus)
    Queued,
    /// Sent through the software GMLAN transmitter
    Bitbanged,
    /// Safety hook refused the transmission
    Rejected,
    /// Bus number outside 0..BUS_MAX
    InvalidBus,
    /// TX queue for the bus was full; counted as an overflow
    QueueFull,
}

/// Result of one TX drain pass on an interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxEvent {
    /// A previous request completed and was acknowledged
    pub completed: bool,
    /// A receipt was pushed to the RX queue
    pub receipt: bool,
    /// The receipt was dropped because the RX queue was full
    pub receipt_dropped: bool,
    /// The completed request ended in a transmission error
    pub tx_error: bool,
    /// The completed request lost arbitration
    pub arbitration_lost: bool,
    /// A queued frame was loaded into the mailbox
    pub loaded: bool,
}

enum Route {
    Bitbang,
    Queue {
        accepted: bool,
        iface: Option<CanInterface>,
    },
}

/// The CAN bus interface layer of the gateway
pub struct CanGateway<H, S> {
    hardware: H,
    hooks: S,
    rx_queue: CanRing<CanFrame>,
    tx_queues: [CanRing<CanFrame>; BUS_MAX],
    topology: Mutex<Cell<BusTopology>>,
    settings: Mutex<Cell<BusSettings>>,
    counters: CanCounters,
}

impl<H: CanHardware, S: SafetyHooks> CanGateway<H, S> {
    /// Build a gateway from a validated configuration.
    ///
    /// Peripherals are not started; call [`init_all`](Self::init_all).
    pub fn new(hardware: H, hooks: S, config: &GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let mut topology = BusTopology::default();
        for rule in &config.forwarding {
            topology.set_forward(rule.from, Some(rule.to));
        }
        if let Some(iface) = config.gmlan {
            topology.assign_gmlan(iface)?;
            hardware.set_bitbang_mode(iface, true);
        }

        let tx_ring = || CanRing::new(TX_QUEUE_SLOTS);
        let gateway = Self {
            hardware,
            hooks,
            rx_queue: CanRing::new(RX_QUEUE_SLOTS)?,
            tx_queues: [tx_ring()?, tx_ring()?, tx_ring()?, tx_ring()?],
            topology: Mutex::new(Cell::new(topology)),
            settings: Mutex::new(Cell::new(BusSettings::from(config))),
            counters: CanCounters::new(),
        };

        info!(
            "CAN gateway created: speeds {:?}, silent mask {:#04X}, GMLAN host {:?}",
            config.speed_table(),
            config.silent_mask,
            config.gmlan
        );
        Ok(gateway)
    }

    /// Peripheral driver
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Safety policy
    pub fn hooks(&self) -> &S {
        &self.hooks
    }

    /// Process-wide counters and live flags
    pub fn counters(&self) -> &CanCounters {
        &self.counters
    }

    /// Copy of the current remapping table
    pub fn topology(&self) -> BusTopology {
        critical_section::with(|cs| self.topology.borrow(cs).get())
    }

    /// Copy of the current bus settings
    pub fn settings(&self) -> BusSettings {
        critical_section::with(|cs| self.settings.borrow(cs).get())
    }

    fn update_topology<R>(&self, f: impl FnOnce(&mut BusTopology) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.topology.borrow(cs);
            let mut topology = cell.get();
            let result = f(&mut topology);
            cell.set(topology);
            result
        })
    }

    fn update_settings(&self, f: impl FnOnce(&mut BusSettings)) {
        critical_section::with(|cs| {
            let cell = self.settings.borrow(cs);
            let mut settings = cell.get();
            f(&mut settings);
            cell.set(settings);
        });
    }

    /// Push onto a queue, counting a rejected push as an overflow
    fn push_counted(&self, queue: &CanRing<CanFrame>, frame: CanFrame) -> bool {
        let accepted = queue.push(frame);
        if !accepted {
            self.counters.record_overflow();
        }
        accepted
    }

    // ------------------------------------------------------------------
    // Interface lifecycle
    // ------------------------------------------------------------------

    /// Bring up one interface with the settings of the bus it currently
    /// serves, then drain anything queued for it.
    ///
    /// On a speed-configuration failure the interface is left enabled but
    /// uninitialised (inert) and the error is returned; the caller must retry
    /// or treat the interface as unavailable.
    pub fn init_interface(&self, iface: CanInterface) -> Result<(), GatewayError> {
        let bus = self.topology().bus_for(iface);
        let settings = self.settings();
        let speed = settings.speed_for(bus);

        self.hardware.set_enabled(iface, true);
        let configured = self.hardware.set_speed(
            iface,
            speed,
            settings.loopback,
            settings.is_silent(iface),
        );
        if !configured {
            warn!("CAN init FAILED on {} ({})", iface, bus);
            return Err(GatewayError::SpeedConfig {
                interface: iface,
                bus: bus.get(),
                speed,
            });
        }

        self.hardware.init(iface);
        debug!("{} up as {} at {}00 bit/s", iface, bus, speed);

        // In case there are queued up messages
        self.handle_tx_interrupt(iface);
        Ok(())
    }

    /// Initialise the interface serving `bus`; no-op when none does
    pub fn init_bus(&self, bus: BusNumber) -> Result<(), GatewayError> {
        match self.topology().interface_for(bus) {
            Some(iface) => self.init_interface(iface),
            None => Ok(()),
        }
    }

    /// Initialise every interface in ascending order.
    ///
    /// A failing interface does not stop the others; all failures are
    /// reported together.
    pub fn init_all(&self) -> Result<(), GatewayError> {
        let failed: Vec<CanInterface> = CanInterface::ALL
            .into_iter()
            .filter(|iface| self.init_interface(*iface).is_err())
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::InitFailed { failed })
        }
    }

    /// Lend interface `target` (1 = CAN2, 2 = CAN3) to the GMLAN bus.
    ///
    /// Any other interface currently hosting GMLAN is returned to its native
    /// bus and reinitialised first. Each affected interface is disabled
    /// before its mapping changes and comes back up through
    /// [`init_interface`](Self::init_interface). Invalid targets are rejected
    /// without any state change.
    pub fn reassign_gmlan(&self, target: u8) -> Result<(), GatewayError> {
        let iface = match CanInterface::from_index(target) {
            Some(iface) if iface.is_gmlan_capable() => iface,
            _ => {
                warn!("GMLAN can only be set on CAN2 or CAN3 (got {})", target);
                return Err(GatewayError::InvalidGmlanTarget(target));
            }
        };

        if let Some(prev) = self.topology().gmlan_host() {
            if prev != iface {
                self.revert_gmlan_host(prev);
            }
        }

        info!("Enable GMLAN on {}", iface);
        self.hardware.set_enabled(iface, false);
        self.hardware.set_bitbang_mode(iface, true);
        self.update_topology(|topology| topology.assign_gmlan(iface))?;
        self.init_interface(iface)
    }

    /// Return the GMLAN host, if any, to its native bus.
    ///
    /// GMLAN traffic falls back to the software transmitter afterwards.
    pub fn release_gmlan(&self) -> Result<(), GatewayError> {
        match self.topology().gmlan_host() {
            Some(host) => {
                self.revert_gmlan_host(host);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn revert_gmlan_host(&self, host: CanInterface) {
        info!("Disable GMLAN on {}", host);
        self.hardware.set_enabled(host, false);
        self.hardware.set_bitbang_mode(host, false);
        self.update_topology(|topology| topology.revert_to_native(host));
        if let Err(err) = self.init_interface(host) {
            warn!("{} did not come back on its native bus: {}", host, err);
        }
    }

    /// Set or clear the static forward target for frames received on `from`.
    ///
    /// With no static target the safety policy decides.
    pub fn set_forward(&self, from: BusNumber, to: Option<BusNumber>) {
        debug!("Forwarding {} -> {:?}", from, to);
        self.update_topology(|topology| topology.set_forward(from, to));
    }

    /// Change the bit rate of a bus (takes effect on the next init)
    pub fn set_speed(&self, bus: BusNumber, speed: u32) -> Result<(), GatewayError> {
        if !GatewayConfig::is_supported_speed(speed) {
            return Err(GatewayError::InvalidConfig(format!(
                "unsupported speed {}",
                speed
            )));
        }
        self.update_settings(|settings| settings.speeds[bus.index()] = speed);
        Ok(())
    }

    /// Enable or disable loopback (takes effect on the next init)
    pub fn set_loopback(&self, loopback: bool) {
        self.update_settings(|settings| settings.loopback = loopback);
    }

    /// Replace the silent-mode mask (takes effect on the next init)
    pub fn set_silent_mask(&self, silent_mask: u8) {
        self.update_settings(|settings| settings.silent_mask = silent_mask);
    }

    // ------------------------------------------------------------------
    // Interrupt handlers
    // ------------------------------------------------------------------

    /// TX mailbox service: runs on the TX-empty interrupt and after every
    /// submit.
    ///
    /// If the mailbox is empty, a completed previous request is counted and,
    /// when it succeeded, reported to the host as a receipt. The completion
    /// flag is acknowledged before the next queued frame is loaded, because
    /// loading a frame would clear it implicitly.
    pub fn handle_tx_interrupt(&self, iface: CanInterface) -> TxEvent {
        let event = critical_section::with(|cs| {
            let bus = self.topology.borrow(cs).get().bus_for(iface);
            let status = self.hardware.tx_status(iface);
            let mut event = TxEvent::default();

            if !status.mailbox_empty {
                return event;
            }

            if status.request_completed {
                self.counters.record_txd();
                event.completed = true;

                if status.tx_ok {
                    let receipt = self.hardware.tx_mailbox(iface).as_receipt(bus);
                    event.receipt = self.push_counted(&self.rx_queue, receipt);
                    event.receipt_dropped = !event.receipt;
                }
                event.tx_error = status.tx_error;
                event.arbitration_lost = status.arbitration_lost;

                self.hardware.acknowledge_tx(iface);
            }

            if let Some(frame) = self.tx_queues[bus.index()].pop() {
                self.counters.record_tx();
                self.hardware.request_tx(iface, &frame);
                event.loaded = true;
            }
            event
        });

        if event.tx_error {
            debug!("CAN TX ERROR on {}", iface);
        }
        if event.arbitration_lost {
            debug!("CAN TX ARBITRATION LOST on {}", iface);
        }
        if event.receipt_dropped {
            debug!("RX queue full, receipt from {} dropped", iface);
        }
        event
    }

    /// RX FIFO service: drains every pending frame on `iface`.
    ///
    /// Each frame is stamped with the logical bus, optionally forwarded,
    /// shown to the inbound safety hook and queued for the host. The hook
    /// observes the frame but does not gate queueing. Returns the number of
    /// frames processed.
    pub fn handle_rx_interrupt(&self, iface: CanInterface) -> usize {
        let mut processed = 0;

        while self.hardware.rx_pending(iface) {
            self.counters.record_rx();

            let topology = self.topology();
            let bus = topology.bus_for(iface);
            let mut frame = self.hardware.read_rx(iface).with_bus(bus);

            let target = topology
                .forward_target(bus)
                .or_else(|| self.hooks.forward_target(bus, &frame));
            if let Some(target) = target {
                let outcome = self.submit(frame.as_tx_request(), target.get());
                if outcome != SubmitOutcome::Queued && outcome != SubmitOutcome::Bitbanged {
                    debug!("Forward {} -> {} not queued: {:?}", bus, target, outcome);
                }
            }

            self.hooks.on_rx(&mut frame);

            self.hardware.set_activity_indicator(true);
            if !self.push_counted(&self.rx_queue, frame) {
                debug!("RX queue full, frame from {} dropped", bus);
            }

            self.hardware.release_rx(iface);
            processed += 1;
        }
        processed
    }

    /// Bus error / status change: count it and let the driver recover
    pub fn handle_error_interrupt(&self, iface: CanInterface) {
        critical_section::with(|_| {
            self.counters.record_error();
            self.hardware.clear_send(iface);
        });
        debug!("{} bus error (total {})", iface, self.counters.err());
    }

    // ------------------------------------------------------------------
    // Host-facing entry points
    // ------------------------------------------------------------------

    /// Transmit `frame` on logical bus `bus`.
    ///
    /// Fire-and-forget: the outcome is informational. Frames for the GMLAN
    /// bus go to the software transmitter while no interface hosts it; all
    /// others are queued and the serving interface is kicked immediately.
    pub fn submit(&self, mut frame: CanFrame, bus: u8) -> SubmitOutcome {
        if !self.hooks.allow_tx(&frame) {
            return SubmitOutcome::Rejected;
        }
        let Some(bus) = BusNumber::new(bus) else {
            debug!("Dropping frame for out-of-range bus {}", bus);
            return SubmitOutcome::InvalidBus;
        };

        // Bus number isn't passed through
        frame.clear_bus_annotation();

        let route = critical_section::with(|cs| {
            let iface = self.topology.borrow(cs).get().interface_for(bus);
            if bus.is_gmlan() && iface.is_none() {
                return Route::Bitbang;
            }
            Route::Queue {
                accepted: self.push_counted(&self.tx_queues[bus.index()], frame),
                iface,
            }
        });

        match route {
            Route::Bitbang => {
                self.hardware.bitbang_transmit(&frame);
                SubmitOutcome::Bitbanged
            }
            Route::Queue { accepted, iface } => {
                if let Some(iface) = iface {
                    self.handle_tx_interrupt(iface);
                }
                if accepted {
                    SubmitOutcome::Queued
                } else {
                    debug!("TX queue for {} full, frame dropped", bus);
                    SubmitOutcome::QueueFull
                }
            }
        }
    }

    /// Take the oldest frame (received frame or receipt) for the host
    pub fn pop_received(&self) -> Option<CanFrame> {
        self.rx_queue.pop()
    }

    /// Frames waiting for the host
    pub fn rx_queue_len(&self) -> usize {
        self.rx_queue.len()
    }

    /// Frames waiting for transmission on `bus`
    pub fn tx_queue_len(&self, bus: BusNumber) -> usize {
        self.tx_queues[bus.index()].len()
    }

    /// Discard everything waiting for the host
    pub fn clear_rx_queue(&self) {
        self.rx_queue.clear();
    }

    /// Discard everything waiting for transmission on `bus`
    pub fn clear_tx_queue(&self, bus: BusNumber) {
        self.tx_queues[bus.index()].clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{AllOutput, NoOutput};
    use crate::sim::{HwEvent, SimulatedHardware, TxResult};

    fn gateway() -> CanGateway<SimulatedHardware, AllOutput> {
        let gateway =
            CanGateway::new(SimulatedHardware::new(), AllOutput, &GatewayConfig::default()).unwrap();
        gateway.init_all().unwrap();
        gateway
    }

    fn frame(id: u32) -> CanFrame {
        CanFrame::new_standard(id, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap()
    }

    #[test]
    fn test_submit_loads_idle_mailbox() {
        let gateway = gateway();

        assert_eq!(gateway.submit(frame(0x123), 0), SubmitOutcome::Queued);
        let loaded = gateway.hardware().pending_tx(CanInterface::Can1).unwrap();
        assert!(loaded.same_content(&frame(0x123)));
        assert_eq!(gateway.tx_queue_len(BusNumber::BUS0), 0);
        assert_eq!(gateway.counters().tx(), 1);
    }

    #[test]
    fn test_submit_waits_for_busy_mailbox() {
        let gateway = gateway();
        gateway.submit(frame(0x100), 1);
        gateway.submit(frame(0x101), 1);

        // Second frame stays queued until the first completes
        assert_eq!(gateway.tx_queue_len(BusNumber::BUS1), 1);

        gateway.hardware().complete_tx(CanInterface::Can2, TxResult::Ok);
        let event = gateway.handle_tx_interrupt(CanInterface::Can2);
        assert!(event.completed && event.receipt && event.loaded);
        assert_eq!(gateway.tx_queue_len(BusNumber::BUS1), 0);
        assert_eq!(gateway.hardware().pending_tx(CanInterface::Can2).unwrap().id, 0x101);
    }

    #[test]
    fn test_submit_rejected_by_safety() {
        let gateway =
            CanGateway::new(SimulatedHardware::new(), NoOutput, &GatewayConfig::default()).unwrap();
        gateway.init_all().unwrap();

        assert_eq!(gateway.submit(frame(0x1), 0), SubmitOutcome::Rejected);
        assert_eq!(gateway.tx_queue_len(BusNumber::BUS0), 0);
        assert_eq!(gateway.hardware().pending_tx(CanInterface::Can1), None);
    }

    #[test]
    fn test_submit_out_of_range_bus() {
        let gateway = gateway();
        assert_eq!(gateway.submit(frame(0x1), 4), SubmitOutcome::InvalidBus);
        assert_eq!(gateway.submit(frame(0x1), 0x81), SubmitOutcome::InvalidBus);
        assert_eq!(gateway.counters().overflow(), 0);
    }

    #[test]
    fn test_submit_clears_annotation() {
        let gateway = gateway();
        let mut stray = frame(0x55).with_bus(BusNumber::BUS2);
        stray.bus |= can_protocol::RECEIPT_FLAG;
        stray.timestamp = 0x4242;

        gateway.submit(stray, 0);
        let loaded = gateway.hardware().pending_tx(CanInterface::Can1).unwrap();
        assert_eq!(loaded.bus, 0);
        assert_eq!(loaded.timestamp, 0);
    }

    #[test]
    fn test_failed_tx_has_no_receipt() {
        let gateway = gateway();
        gateway.submit(frame(0x10), 0);

        gateway.hardware().complete_tx(CanInterface::Can1, TxResult::ArbitrationLost);
        let event = gateway.handle_tx_interrupt(CanInterface::Can1);
        assert!(event.completed && event.arbitration_lost && !event.receipt);
        assert_eq!(gateway.counters().txd(), 1);
        assert_eq!(gateway.pop_received(), None);
    }

    #[test]
    fn test_completion_acknowledged_before_next_request() {
        let gateway = gateway();
        gateway.submit(frame(0x20), 0);
        gateway.submit(frame(0x21), 0);
        gateway.hardware().take_events();

        gateway.hardware().complete_tx(CanInterface::Can1, TxResult::Ok);
        gateway.handle_tx_interrupt(CanInterface::Can1);

        let events = gateway.hardware().take_events();
        let ack = events
            .iter()
            .position(|e| *e == HwEvent::TxAcknowledged(CanInterface::Can1))
            .unwrap();
        let request = events
            .iter()
            .position(|e| matches!(e, HwEvent::TxRequested { iface: CanInterface::Can1, .. }))
            .unwrap();
        assert!(ack < request);
    }

    #[test]
    fn test_error_interrupt() {
        let gateway = gateway();
        gateway.handle_error_interrupt(CanInterface::Can3);
        gateway.handle_error_interrupt(CanInterface::Can3);

        assert_eq!(gateway.counters().err(), 2);
        let clears = gateway
            .hardware()
            .events()
            .into_iter()
            .filter(|e| *e == HwEvent::ClearSend(CanInterface::Can3))
            .count();
        assert_eq!(clears, 2);
    }

    #[test]
    fn test_set_speed_validation() {
        let gateway = gateway();
        assert!(gateway.set_speed(BusNumber::BUS1, 2500).is_ok());
        assert_eq!(gateway.settings().speed_for(BusNumber::BUS1), 2500);
        assert!(gateway.set_speed(BusNumber::BUS1, 1234).is_err());
        assert_eq!(gateway.settings().speed_for(BusNumber::BUS1), 2500);
    }
}
