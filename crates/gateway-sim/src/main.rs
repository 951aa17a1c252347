//! CAN Gateway Simulator - Main Entry Point

use clap::Parser;
use gateway_sim::{init_logging, load_config, run};
use tracing::info;

/// Run the CAN gateway against simulated peripherals and print its counters
#[derive(Parser, Debug)]
#[command(name = "gateway-sim")]
#[command(about = "CAN gateway simulator", long_about = None)]
struct Args {
    /// Gateway config file (TOML, JSON or YAML)
    #[arg(long)]
    config: Option<String>,

    /// Frames to submit, round-robin over all buses
    #[arg(long, default_value = "16")]
    frames: usize,

    /// Force internal loopback on every interface
    #[arg(long)]
    loopback: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    info!("=== CAN Gateway Simulator v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;
    config.loopback |= args.loopback;

    let report = run(&config, args.frames)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
