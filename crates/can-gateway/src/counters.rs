//! Process-Wide CAN Statistics
//!
//! Monotonic counters and the bus-live flags read by the health monitor.
//! Everything is a relaxed atomic: counters are diagnostics, never used to
//! order other memory accesses.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Counters shared by every interrupt context and the foreground
#[derive(Debug, Default)]
pub struct CanCounters {
    rx: AtomicU32,
    tx: AtomicU32,
    txd: AtomicU32,
    err: AtomicU32,
    overflow: AtomicU32,
    live: AtomicBool,
    pending_live: AtomicBool,
}

/// Point-in-time copy of [`CanCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Frames read from RX FIFOs
    pub rx: u32,
    /// Frames loaded into TX mailboxes
    pub tx: u32,
    /// TX requests that completed (successfully or not)
    pub txd: u32,
    /// Bus error / status change interrupts
    pub err: u32,
    /// Pushes rejected by a full queue
    pub overflow: u32,
    /// A frame was seen during the last health period
    pub live: bool,
    /// A frame was seen during the current health period
    pub pending_live: bool,
}

impl CanCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_rx(&self) {
        self.rx.fetch_add(1, Ordering::Relaxed);
        self.pending_live.store(true, Ordering::Relaxed);
    }

    pub(crate) fn record_tx(&self) {
        self.tx.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txd(&self) {
        self.txd.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.err.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames received
    pub fn rx(&self) -> u32 {
        self.rx.load(Ordering::Relaxed)
    }

    /// Frames loaded for transmission
    pub fn tx(&self) -> u32 {
        self.tx.load(Ordering::Relaxed)
    }

    /// Transmissions completed
    pub fn txd(&self) -> u32 {
        self.txd.load(Ordering::Relaxed)
    }

    /// Bus errors
    pub fn err(&self) -> u32 {
        self.err.load(Ordering::Relaxed)
    }

    /// Queue overflows
    pub fn overflow(&self) -> u32 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Bus traffic seen during the last completed health period
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Bus traffic seen since the last health tick
    pub fn is_pending_live(&self) -> bool {
        self.pending_live.load(Ordering::Relaxed)
    }

    /// Close a health period: `live` takes the pending value, pending resets.
    ///
    /// Called periodically (once per second on the device). Returns the new
    /// `live` value.
    pub fn tick_health(&self) -> bool {
        let seen = self.pending_live.swap(false, Ordering::Relaxed);
        self.live.store(seen, Ordering::Relaxed);
        seen
    }

    /// Copy all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rx: self.rx(),
            tx: self.tx(),
            txd: self.txd(),
            err: self.err(),
            overflow: self.overflow(),
            live: self.is_live(),
            pending_live: self.is_pending_live(),
        }
    }
}
