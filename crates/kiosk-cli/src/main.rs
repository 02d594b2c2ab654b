//! Kiosk Monitor
//!
//! Runs one kiosk device under the device manager and prints the status
//! signals it emits until interrupted.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, format_event};
use kiosk_hardware::mock::MockDriver;
use kiosk_hardware::{DeviceBuilder, DeviceManager, DeviceType};
use logging::init_logging;
use tracing::info;

/// Slot the monitored device is registered under.
const SLOT: &str = "device";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level).context("failed to set up logging")?;

    info!("Kiosk Monitor v{}", kiosk_core::VERSION);
    let config = cli::load_config(&args)?;
    let device_type = DeviceType::from(args.device_type);

    let (driver, control) = MockDriver::new(device_type);
    control.set_model(config.name.clone());
    let core = DeviceBuilder::new(config, driver)
        .build()
        .context("failed to build the device")?;

    let mut manager = DeviceManager::new();
    manager.register(SLOT, core)?;
    let mut handle = manager.start().await.context("failed to start the device")?;

    let mut seen = 0;
    loop {
        tokio::select! {
            event = handle.recv() => {
                let Some(event) = event else { break };
                println!("{}", format_event(&event, args.json)?);
                seen += 1;

                if args.unplug_after == Some(seen) {
                    info!("Simulating a cable pull");
                    control.set_connected(false);
                }
                if args.events.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let stats = handle.stats();
    info!(
        "Shutting down: {} devices, {} connected, {} initialized",
        stats.devices, stats.connected, stats.initialized
    );
    handle.shutdown().await?;
    Ok(())
}
