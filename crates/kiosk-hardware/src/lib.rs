//! Device status and polling core for kiosk peripherals.
//!
//! This crate drives the peripherals of a self-service kiosk or POS
//! terminal: printers, bill acceptors, card readers and the like. Every
//! device goes through the same lifecycle (find, identify, initialize, poll,
//! release) and reports its health as a set of [`status codes`](status::codes)
//! grouped by severity.
//!
//! # Layers
//!
//! - [`status`]: status codes, the per-severity collection and the
//!   [`StatusTracker`](status::StatusTracker) that debounces raw poll results
//!   into published signals
//! - [`transport`]: serial, USB and LibUSB bindings over an [`IoPort`](transport::IoPort),
//!   with a shared [`EndpointRegistry`](transport::EndpointRegistry) so two
//!   devices never claim the same endpoint
//! - [`device`]: the [`DeviceCore`](device::DeviceCore) state machine and the
//!   [`DeviceHandle`](device::DeviceHandle) that runs it on its own thread
//! - [`drivers`]: concrete protocol drivers
//! - [`manager`]: owns all devices of one kiosk and merges their events
//!
//! # Example
//!
//! ```no_run
//! use kiosk_hardware::device::{DeviceBuilder, DeviceHandle, Signal};
//! use kiosk_hardware::mock::MockDriver;
//! use kiosk_hardware::types::DeviceType;
//! use kiosk_core::DeviceConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> kiosk_hardware::Result<()> {
//!     let (driver, _control) = MockDriver::new(DeviceType::Printer);
//!     let core = DeviceBuilder::new(DeviceConfig::new("Printer"), driver).build()?;
//!
//!     let device = DeviceHandle::new(core);
//!     let mut status = device.subscribe(Signal::Status, "host").expect("first subscriber");
//!     device.initialize().await?;
//!
//!     if let Some(event) = status.recv().await {
//!         println!("{event:?}");
//!     }
//!     device.shutdown().await
//! }
//! ```
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides a scripted [`IoPort`](transport::IoPort) and
//! a scripted [`DeviceDriver`](device::DeviceDriver) for running the whole
//! stack without physical hardware.

pub mod device;
pub mod drivers;
pub mod error;
pub mod manager;
pub mod mock;
pub mod status;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use device::{
    DeviceBuilder, DeviceCore, DeviceDriver, DeviceEvent, DeviceHandle, DeviceSnapshot, Signal,
};
pub use error::{HardwareError, Result};
pub use status::{StatusCode, StatusCollection, StatusSignal};
pub use types::{DeviceFlags, DeviceInfo, DeviceType};

// Re-export manager types
pub use manager::{DeviceManager, ManagerEvent, ManagerHandle, ManagerStats};
