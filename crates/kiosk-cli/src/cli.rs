//! Command line arguments and output formatting.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kiosk_core::DeviceConfig;
use kiosk_hardware::{DeviceEvent, DeviceType, ManagerEvent};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kiosk-monitor")]
#[command(author, version, about = "Kiosk Monitor - Watch the status of a kiosk device")]
#[command(long_about = "
Runs one device under the device manager and prints every status signal
it emits. Without real hardware a scripted mock driver stands in.

EXAMPLES:
    # Watch a mock printer polled every second
    kiosk-monitor

    # Use a device configuration file
    kiosk-monitor --config printer.json

    # Simulate a cable pull after three signals, print JSON
    kiosk-monitor --unplug-after 3 --json

    # Run with debug logging
    kiosk-monitor --log-level debug
")]
pub struct Args {
    /// Path to a JSON device configuration
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Kind of device to simulate
    #[arg(short, long, value_enum, default_value_t = DeviceKind::Printer)]
    pub device_type: DeviceKind,

    /// Polling interval when the configuration sets none
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub interval_ms: u64,

    /// Exit after this many events
    #[arg(short, long, value_name = "N")]
    pub events: Option<usize>,

    /// Disconnect the simulated device after this many events
    #[arg(long, value_name = "N")]
    pub unplug_after: Option<usize>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Printer,
    CardReader,
    Dispenser,
    Scanner,
    CashAcceptor,
}

impl From<DeviceKind> for DeviceType {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Printer => DeviceType::Printer,
            DeviceKind::CardReader => DeviceType::CardReader,
            DeviceKind::Dispenser => DeviceType::Dispenser,
            DeviceKind::Scanner => DeviceType::Scanner,
            DeviceKind::CashAcceptor => DeviceType::CashAcceptor,
        }
    }
}

/// Load the device configuration, filling in the polling interval.
pub fn load_config(args: &Args) -> Result<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => DeviceConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => DeviceConfig::new(format!("Mock {}", DeviceType::from(args.device_type))),
    };

    if config.polling_interval_ms.is_none() {
        config.polling_interval_ms = Some(args.interval_ms);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Render one event as a line of output.
pub fn format_event(event: &ManagerEvent, json: bool) -> Result<String> {
    let line = match (&event.event, json) {
        (DeviceEvent::Status(signal), true) => serde_json::to_string(&serde_json::json!({
            "slot": event.slot,
            "event": "status",
            "status": signal,
        }))?,
        (DeviceEvent::Status(signal), false) => format!(
            "{}: [{}] {} ({:?})",
            event.slot, signal.level, signal.message, signal.extended
        ),
        (_, true) => serde_json::to_string(&serde_json::json!({
            "slot": event.slot,
            "event": "initialized",
        }))?,
        (_, false) => format!("{}: initialized", event.slot),
    };
    Ok(line)
}
