//! CAN Gateway Simulation Harness
//!
//! Drives a [`CanGateway`] over simulated peripherals the way the device
//! firmware would: host bulk-out records in, TX/RX interrupts in between,
//! bulk-in records out.

use anyhow::Context;
// Links the host critical-section backend
use critical_section as _;
use can_gateway::host::{drain_to_host, submit_from_host};
use can_gateway::sim::{SimulatedHardware, TxResult};
use can_gateway::{AllOutput, CanGateway, CounterSnapshot, GatewayConfig};
use can_protocol::{BusNumber, CanFrame, CanInterface, MailboxWords, MAILBOX_SIZE};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Largest bulk-in transfer drained per poll
pub const BULK_IN_SIZE: usize = 64;

/// Outcome of one simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    /// Frames submitted by the simulated host
    pub submitted: usize,
    /// Receipts returned to the host
    pub receipts: usize,
    /// Ordinary frames returned to the host
    pub received: usize,
    /// Frames sent through the software GMLAN transmitter
    pub bitbanged: usize,
    /// Gateway counters at the end of the run
    pub counters: CounterSnapshot,
}

/// Initialize logging, honouring `RUST_LOG`
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Load a config file, or fall back to the built-in defaults
pub fn load_config(path: Option<&str>) -> anyhow::Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path).with_context(|| format!("loading {}", path)),
        None => Ok(GatewayConfig::default()),
    }
}

/// Send `frames` frames round-robin over every bus, completing each
/// transmission and pumping every interrupt until the host has drained all
/// traffic.
pub fn run(config: &GatewayConfig, frames: usize) -> anyhow::Result<SimReport> {
    let gateway = CanGateway::new(SimulatedHardware::new(), AllOutput, config)?;
    gateway.init_all()?;
    info!("Simulating {} frames", frames);

    let mut out = Vec::with_capacity(frames * MAILBOX_SIZE);
    for n in 0..frames {
        let bus = BusNumber::ALL[n % BusNumber::ALL.len()];
        let payload = (n as u32).to_le_bytes();
        let frame = CanFrame::new_standard(0x100 + (n as u32 % 0x700), &payload)?.with_bus(bus);
        out.extend_from_slice(&MailboxWords::from_frame(&frame).encode());
    }

    let mut report = SimReport {
        submitted: 0,
        receipts: 0,
        received: 0,
        bitbanged: 0,
        counters: CounterSnapshot::default(),
    };
    let mut bulk_in = [0u8; BULK_IN_SIZE];

    for record in out.chunks(MAILBOX_SIZE) {
        report.submitted += submit_from_host(&gateway, record)?;
        pump(&gateway);

        loop {
            let len = drain_to_host(&gateway, &mut bulk_in);
            if len == 0 {
                break;
            }
            for chunk in bulk_in[..len].chunks_exact(MAILBOX_SIZE) {
                let frame = MailboxWords::decode(chunk)?.to_frame()?;
                debug!("bulk-in {:03X} bus {:#04X}", frame.id, frame.bus);
                if frame.is_receipt() {
                    report.receipts += 1;
                } else {
                    report.received += 1;
                }
            }
        }
    }

    report.bitbanged = gateway.hardware().bitbanged().len();
    report.counters = gateway.counters().snapshot();
    gateway.counters().tick_health();
    info!(
        "Done: {} receipts, {} received, {} bit-banged",
        report.receipts, report.received, report.bitbanged
    );
    Ok(report)
}

/// Finish every pending transmission and service the interrupts it raises
fn pump(gateway: &CanGateway<SimulatedHardware, AllOutput>) {
    for iface in CanInterface::ALL {
        while gateway.hardware().complete_tx(iface, TxResult::Ok).is_some() {
            gateway.handle_tx_interrupt(iface);
        }
        gateway.handle_rx_interrupt(iface);
    }
}
