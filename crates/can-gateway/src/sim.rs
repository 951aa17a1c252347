//! Simulated CAN Peripherals
//!
//! A host-side model of the three bxCAN peripherals and the board glue,
//! implementing [`CanHardware`]. It keeps an ordered log of every driver
//! call so tests can check sequencing, and lets callers inject received
//! frames and finish pending transmissions.
//!
//! Modelled behaviour:
//! - a disabled or unconfigured peripheral reads back an all-zero TX status
//!   (mailbox never empty), so nothing drains into it
//! - requesting a transmission clears the previous completion flags
//! - in loopback mode a successful transmission is also received locally
//! - `clear_send` aborts a pending request (completed, not OK)
//! - completed transmissions carry a per-peripheral capture timestamp

use can_protocol::{CanFrame, CanInterface, CAN_MAX};
use core::cell::RefCell;
use critical_section::Mutex;
use std::collections::VecDeque;

use crate::config::GatewayConfig;
use crate::hardware::{CanHardware, TxStatus};

/// Driver call recorded by [`SimulatedHardware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    Enabled {
        iface: CanInterface,
        enabled: bool,
    },
    SpeedSet {
        iface: CanInterface,
        speed: u32,
        loopback: bool,
        silent: bool,
        accepted: bool,
    },
    Init(CanInterface),
    BitbangMode {
        iface: CanInterface,
        enabled: bool,
    },
    ClearSend(CanInterface),
    TxAcknowledged(CanInterface),
    TxRequested {
        iface: CanInterface,
        frame: CanFrame,
    },
    RxReleased(CanInterface),
    Bitbanged(CanFrame),
}

/// How a pending transmission ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxResult {
    /// Acknowledged on the bus
    Ok,
    /// Transmission error
    Error,
    /// Lost arbitration
    ArbitrationLost,
}

#[derive(Debug, Clone, Default)]
struct Peripheral {
    enabled: bool,
    speed_accepted: bool,
    running: bool,
    bitbang: bool,
    reject_speed: bool,
    speed: u32,
    loopback: bool,
    silent: bool,
    clock: u16,
    mailbox: CanFrame,
    status: TxStatus,
    rx_fifo: VecDeque<CanFrame>,
}

impl Peripheral {
    fn visible_status(&self) -> TxStatus {
        if self.running {
            self.status
        } else {
            TxStatus::default()
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    peripherals: [Peripheral; CAN_MAX],
    events: Vec<HwEvent>,
    bitbanged: Vec<CanFrame>,
    indicator: bool,
}

/// Software model of the gateway's CAN hardware
pub struct SimulatedHardware {
    state: Mutex<RefCell<SimState>>,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHardware {
    /// Create three powered-down peripherals
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SimState::default())),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    fn with_peripheral<R>(&self, iface: CanInterface, f: impl FnOnce(&mut Peripheral) -> R) -> R {
        self.with_state(|state| f(&mut state.peripherals[iface.index()]))
    }

    /// Make the next speed configuration on `iface` fail (or succeed again)
    pub fn reject_speed(&self, iface: CanInterface, reject: bool) {
        self.with_peripheral(iface, |p| p.reject_speed = reject);
    }

    /// Deliver a frame into the RX FIFO. Returns `false` if the peripheral
    /// is not running.
    pub fn inject_rx(&self, iface: CanInterface, frame: CanFrame) -> bool {
        self.with_peripheral(iface, |p| {
            if p.running {
                p.rx_fifo.push_back(frame);
            }
            p.running
        })
    }

    /// Frame currently waiting in the TX mailbox, if any
    pub fn pending_tx(&self, iface: CanInterface) -> Option<CanFrame> {
        self.with_peripheral(iface, |p| {
            (p.running && !p.status.mailbox_empty).then_some(p.mailbox)
        })
    }

    /// Finish the pending transmission on `iface`.
    ///
    /// Returns the transmitted frame, or `None` if the mailbox was idle.
    pub fn complete_tx(&self, iface: CanInterface, result: TxResult) -> Option<CanFrame> {
        self.with_peripheral(iface, |p| {
            if !p.running || p.status.mailbox_empty {
                return None;
            }
            p.status = TxStatus {
                mailbox_empty: true,
                request_completed: true,
                tx_ok: result == TxResult::Ok,
                tx_error: result == TxResult::Error,
                arbitration_lost: result == TxResult::ArbitrationLost,
            };
            // Timestamp latched at start of frame
            p.clock = p.clock.wrapping_add(1);
            p.mailbox.timestamp = p.clock;
            let mut sent = p.mailbox;
            sent.tx_request = false;
            if p.loopback && result == TxResult::Ok {
                p.rx_fifo.push_back(sent);
            }
            Some(sent)
        })
    }

    /// Check if `iface` is enabled and initialised
    pub fn is_running(&self, iface: CanInterface) -> bool {
        self.with_peripheral(iface, |p| p.running)
    }

    /// Check if `iface` is wired for GMLAN bit-banging
    pub fn is_bitbang_mode(&self, iface: CanInterface) -> bool {
        self.with_peripheral(iface, |p| p.bitbang)
    }

    /// Last programmed speed on `iface`
    pub fn speed(&self, iface: CanInterface) -> u32 {
        self.with_peripheral(iface, |p| p.speed)
    }

    /// Check if `iface` was last configured in silent mode
    pub fn is_silent(&self, iface: CanInterface) -> bool {
        self.with_peripheral(iface, |p| p.silent)
    }

    /// Frames still waiting in the RX FIFO of `iface`
    pub fn rx_backlog(&self, iface: CanInterface) -> usize {
        self.with_peripheral(iface, |p| p.rx_fifo.len())
    }

    /// Activity indicator state
    pub fn indicator(&self) -> bool {
        self.with_state(|state| state.indicator)
    }

    /// Copy of the driver call log
    pub fn events(&self) -> Vec<HwEvent> {
        self.with_state(|state| state.events.clone())
    }

    /// Drain the driver call log
    pub fn take_events(&self) -> Vec<HwEvent> {
        self.with_state(|state| std::mem::take(&mut state.events))
    }

    /// Frames sent through the software GMLAN transmitter
    pub fn bitbanged(&self) -> Vec<CanFrame> {
        self.with_state(|state| state.bitbanged.clone())
    }
}

impl CanHardware for SimulatedHardware {
    fn set_enabled(&self, iface: CanInterface, enabled: bool) {
        self.with_state(|state| {
            let p = &mut state.peripherals[iface.index()];
            p.enabled = enabled;
            if !enabled {
                p.running = false;
                p.speed_accepted = false;
                p.rx_fifo.clear();
            }
            state.events.push(HwEvent::Enabled { iface, enabled });
        });
    }

    fn set_speed(&self, iface: CanInterface, speed: u32, loopback: bool, silent: bool) -> bool {
        self.with_state(|state| {
            let p = &mut state.peripherals[iface.index()];
            let accepted =
                p.enabled && !p.reject_speed && GatewayConfig::is_supported_speed(speed);
            p.speed = speed;
            p.loopback = loopback;
            p.silent = silent;
            p.speed_accepted = accepted;
            if !accepted {
                p.running = false;
            }
            state.events.push(HwEvent::SpeedSet {
                iface,
                speed,
                loopback,
                silent,
                accepted,
            });
            accepted
        })
    }

    fn init(&self, iface: CanInterface) {
        self.with_state(|state| {
            let p = &mut state.peripherals[iface.index()];
            p.running = p.enabled && p.speed_accepted;
            p.status = TxStatus {
                mailbox_empty: true,
                ..Default::default()
            };
            state.events.push(HwEvent::Init(iface));
        });
    }

    fn set_bitbang_mode(&self, iface: CanInterface, enabled: bool) {
        self.with_state(|state| {
            state.peripherals[iface.index()].bitbang = enabled;
            state.events.push(HwEvent::BitbangMode { iface, enabled });
        });
    }

    fn clear_send(&self, iface: CanInterface) {
        self.with_state(|state| {
            let p = &mut state.peripherals[iface.index()];
            if !p.status.mailbox_empty {
                p.status = TxStatus {
                    mailbox_empty: true,
                    request_completed: true,
                    ..Default::default()
                };
            }
            state.events.push(HwEvent::ClearSend(iface));
        });
    }

    fn tx_status(&self, iface: CanInterface) -> TxStatus {
        self.with_peripheral(iface, |p| p.visible_status())
    }

    fn tx_mailbox(&self, iface: CanInterface) -> CanFrame {
        self.with_peripheral(iface, |p| p.mailbox)
    }

    fn acknowledge_tx(&self, iface: CanInterface) {
        self.with_state(|state| {
            let status = &mut state.peripherals[iface.index()].status;
            status.request_completed = false;
            status.tx_ok = false;
            status.tx_error = false;
            status.arbitration_lost = false;
            state.events.push(HwEvent::TxAcknowledged(iface));
        });
    }

    fn request_tx(&self, iface: CanInterface, frame: &CanFrame) {
        self.with_state(|state| {
            let p = &mut state.peripherals[iface.index()];
            p.mailbox = frame.as_tx_request();
            // A new request clears the completion flags in hardware
            p.status = TxStatus::default();
            state.events.push(HwEvent::TxRequested {
                iface,
                frame: *frame,
            });
        });
    }

    fn rx_pending(&self, iface: CanInterface) -> bool {
        self.with_peripheral(iface, |p| p.running && !p.rx_fifo.is_empty())
    }

    fn read_rx(&self, iface: CanInterface) -> CanFrame {
        self.with_peripheral(iface, |p| p.rx_fifo.front().copied().unwrap_or_default())
    }

    fn release_rx(&self, iface: CanInterface) {
        self.with_state(|state| {
            state.peripherals[iface.index()].rx_fifo.pop_front();
            state.events.push(HwEvent::RxReleased(iface));
        });
    }

    fn set_activity_indicator(&self, on: bool) {
        self.with_state(|state| state.indicator = on);
    }

    fn bitbang_transmit(&self, frame: &CanFrame) {
        self.with_state(|state| {
            state.bitbanged.push(*frame);
            state.events.push(HwEvent::Bitbanged(*frame));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(hw: &SimulatedHardware, iface: CanInterface) {
        hw.set_enabled(iface, true);
        assert!(hw.set_speed(iface, 5000, false, false));
        hw.init(iface);
    }

    #[test]
    fn test_powered_down_mailbox_is_never_empty() {
        let hw = SimulatedHardware::new();
        assert_eq!(hw.tx_status(CanInterface::Can1), TxStatus::default());

        start(&hw, CanInterface::Can1);
        assert!(hw.tx_status(CanInterface::Can1).mailbox_empty);
    }

    #[test]
    fn test_request_clears_completion_flags() {
        let hw = SimulatedHardware::new();
        start(&hw, CanInterface::Can2);
        let frame = CanFrame::new_standard(0x10, &[1]).unwrap();

        hw.request_tx(CanInterface::Can2, &frame);
        hw.complete_tx(CanInterface::Can2, TxResult::Ok);
        assert!(hw.tx_status(CanInterface::Can2).tx_ok);

        hw.request_tx(CanInterface::Can2, &frame);
        let status = hw.tx_status(CanInterface::Can2);
        assert!(!status.mailbox_empty && !status.request_completed && !status.tx_ok);
    }

    #[test]
    fn test_loopback_receives_own_frame() {
        let hw = SimulatedHardware::new();
        hw.set_enabled(CanInterface::Can1, true);
        hw.set_speed(CanInterface::Can1, 5000, true, false);
        hw.init(CanInterface::Can1);

        let frame = CanFrame::new_standard(0x7DF, &[2, 1, 0]).unwrap();
        hw.request_tx(CanInterface::Can1, &frame);
        hw.complete_tx(CanInterface::Can1, TxResult::Ok);

        assert!(hw.rx_pending(CanInterface::Can1));
        assert!(hw.read_rx(CanInterface::Can1).same_content(&frame));
    }

    #[test]
    fn test_rejected_speed_leaves_peripheral_down() {
        let hw = SimulatedHardware::new();
        hw.reject_speed(CanInterface::Can3, true);
        hw.set_enabled(CanInterface::Can3, true);
        assert!(!hw.set_speed(CanInterface::Can3, 5000, false, false));
        hw.init(CanInterface::Can3);

        assert!(!hw.is_running(CanInterface::Can3));
        assert!(!hw.inject_rx(CanInterface::Can3, CanFrame::default()));
    }

    #[test]
    fn test_clear_send_aborts_pending() {
        let hw = SimulatedHardware::new();
        start(&hw, CanInterface::Can1);
        hw.request_tx(CanInterface::Can1, &CanFrame::default());

        hw.clear_send(CanInterface::Can1);
        let status = hw.tx_status(CanInterface::Can1);
        assert!(status.mailbox_empty && status.request_completed && !status.tx_ok);
    }
}
