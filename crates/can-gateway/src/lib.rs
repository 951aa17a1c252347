//! CAN Bus Interface Layer
//!
//! Bridges a host transport to up to four logical CAN buses served by
//! three physical peripherals, one of which can be lent to a software GMLAN
//! bus. The crate owns the queues, the bus remapping table and the
//! interrupt-time TX/RX engines; register access, safety policy and the
//! transport are supplied by the embedding firmware through
//! [`CanHardware`] and [`SafetyHooks`].

pub mod config;
mod counters;
mod error;
mod gateway;
mod hardware;
pub mod hooks;
pub mod host;
pub mod sim;
mod topology;

pub use config::{BusSettings, ForwardRule, GatewayConfig};
pub use counters::{CanCounters, CounterSnapshot};
pub use error::GatewayError;
pub use gateway::{CanGateway, SubmitOutcome, TxEvent, RX_QUEUE_SLOTS, TX_QUEUE_SLOTS};
pub use hardware::{CanHardware, TxStatus};
pub use hooks::{AllOutput, NoOutput, SafetyHooks};
pub use topology::BusTopology;

pub use can_protocol::{BusNumber, CanFrame, CanInterface, BUS_MAX, CAN_MAX, RECEIPT_FLAG};
