//! Safety Policy Hooks
//!
//! The gateway does not decide what may be transmitted or forwarded. It asks
//! a [`SafetyHooks`] implementation at three points: before queueing a
//! transmission, when a frame has no static forward target, and after every
//! received frame.

use can_protocol::{BusNumber, CanFrame};

/// Policy consulted by the TX entry point and the RX engine.
///
/// Hooks run in interrupt context: they must return quickly and never block.
pub trait SafetyHooks: Sync {
    /// Decide whether a frame may be transmitted (`true` = allow)
    fn allow_tx(&self, frame: &CanFrame) -> bool;

    /// Observe (or rewrite) a received frame before it is queued for the host
    fn on_rx(&self, frame: &mut CanFrame);

    /// Pick a bus to forward a received frame to, if any.
    ///
    /// Only consulted when no static forward target is configured for `bus`.
    fn forward_target(&self, bus: BusNumber, frame: &CanFrame) -> Option<BusNumber>;
}

/// Allow every transmission, forward nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct AllOutput;

impl SafetyHooks for AllOutput {
    fn allow_tx(&self, _frame: &CanFrame) -> bool {
        true
    }

    fn on_rx(&self, _frame: &mut CanFrame) {}

    fn forward_target(&self, _bus: BusNumber, _frame: &CanFrame) -> Option<BusNumber> {
        None
    }
}

/// Reject every transmission, forward nothing (boot-time default)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutput;

impl SafetyHooks for NoOutput {
    fn allow_tx(&self, _frame: &CanFrame) -> bool {
        false
    }

    fn on_rx(&self, _frame: &mut CanFrame) {}

    fn forward_target(&self, _bus: BusNumber, _frame: &CanFrame) -> Option<BusNumber> {
        None
    }
}
