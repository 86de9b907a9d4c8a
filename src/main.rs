use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pwm_car_runtime::config::{
    BridgeConfig, DEFAULT_CALIBRATION_PATH, FULL_BRIDGE_INPUT_MILLIVOLT, FULL_BRIDGE_LOSS_MILLIVOLT,
};

/// Ramped PWM motor control for a 2 wheel car, commanded over zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Calibration file (drive speed and compensation per motor)
    #[arg(long, default_value = DEFAULT_CALIBRATION_PATH)]
    calibration: PathBuf,

    /// Supply voltage of the motor bridge in millivolt
    #[arg(long, default_value_t = FULL_BRIDGE_INPUT_MILLIVOLT)]
    input_millivolt: u32,

    /// Voltage lost in the bridge in millivolt (2200 for an L298)
    #[arg(long, default_value_t = FULL_BRIDGE_LOSS_MILLIVOLT)]
    loss_millivolt: u32,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let bridge = BridgeConfig::new(args.input_millivolt, args.loss_millivolt);

    if let Err(e) = pwm_car_runtime::runtime::run(bridge, args.calibration).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
