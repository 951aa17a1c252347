//! Interrupt-Safe Ring Buffer
//!
//! Provides the bounded FIFO used for the unified RX queue and the per-bus
//! TX queues. Every operation runs inside a short critical section, so a
//! producer in interrupt context and a consumer in foreground context can
//! share one ring without a blocking lock.

mod buffer;

pub use buffer::{CanRing, RingError};
