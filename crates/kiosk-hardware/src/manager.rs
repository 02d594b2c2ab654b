//! Device manager.
//!
//! This module provides the [`DeviceManager`], which owns one
//! [`DeviceHandle`] per configured slot and merges the signals of every
//! device into one event stream for the host application.
//!
//! # Architecture
//!
//! Each device runs on its own thread (see [`crate::device`]). The manager
//! subscribes to each device's signals and runs one forwarding task per
//! device that tags events with the slot name.
//!
//! ```text
//! ┌──────────┐  status / initialized  ┌───────────┐
//! │ printer  │───────────────────────►│ forwarder │──┐
//! │ thread   │                        │ task      │  │   ┌───────────────┐
//! └──────────┘                        └───────────┘  ├──►│ Event Channel │──► Host
//! ┌──────────┐                        ┌───────────┐  │   │ (mpsc)        │
//! │ reader   │───────────────────────►│ forwarder │──┘   └───────────────┘
//! │ thread   │                        │ task      │
//! └──────────┘                        └───────────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use kiosk_hardware::device::DeviceBuilder;
//! use kiosk_hardware::manager::DeviceManager;
//! use kiosk_hardware::mock::MockDriver;
//! use kiosk_hardware::types::DeviceType;
//! use kiosk_core::DeviceConfig;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_hardware::Result<()> {
//!     let mut manager = DeviceManager::new();
//!
//!     let (driver, _control) = MockDriver::new(DeviceType::Printer);
//!     let core = DeviceBuilder::new(DeviceConfig::new("Printer"), driver).build()?;
//!     manager.register("printer", core)?;
//!
//!     // Initialize every device and receive their events
//!     let mut handle = manager.start().await?;
//!     while let Some(event) = handle.recv().await {
//!         println!("{}: {:?}", event.slot, event.event);
//!     }
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::Result;
use crate::device::{DeviceCore, DeviceEvent, DeviceHandle, Signal};
use crate::error::HardwareError;
use crate::transport::EndpointRegistry;
use kiosk_core::InitState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Capacity of the merged event channel.
const EVENT_CHANNEL_SIZE: usize = 100;

/// Receiver name the manager subscribes under.
const MANAGER_RECEIVER: &str = "device-manager";

/// Event from one device, tagged with its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEvent {
    pub slot: String,
    pub event: DeviceEvent,
}

/// Counts over the managed devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub devices: usize,
    pub connected: usize,
    pub initialized: usize,
}

fn stats_of<'a>(devices: impl Iterator<Item = &'a DeviceHandle>) -> ManagerStats {
    devices.fold(ManagerStats::default(), |mut stats, device| {
        let status = device.status();
        stats.devices += 1;
        stats.connected += usize::from(status.connected);
        stats.initialized += usize::from(status.init_state == InitState::Success);
        stats
    })
}

/// Handle for receiving events from the managed devices.
///
/// Returned by [`DeviceManager::start`]. Holds the device handles, so the
/// devices live as long as this handle does.
#[derive(Debug)]
pub struct ManagerHandle {
    event_rx: mpsc::Receiver<ManagerEvent>,
    tasks: JoinSet<Result<()>>,
    devices: Vec<(String, DeviceHandle)>,
}

impl ManagerHandle {
    /// Receive the next event from any device.
    ///
    /// Returns `None` once every forwarding task has stopped.
    pub async fn recv(&mut self) -> Option<ManagerEvent> {
        self.event_rx.recv().await
    }

    #[must_use]
    pub fn device(&self, slot: &str) -> Option<&DeviceHandle> {
        find_slot(&self.devices, slot)
    }

    pub fn devices(&self) -> impl Iterator<Item = (&str, &DeviceHandle)> {
        self.devices
            .iter()
            .map(|(slot, device)| (slot.as_str(), device))
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        stats_of(self.devices.iter().map(|(_, device)| device))
    }

    /// Release every device and stop the forwarding tasks.
    ///
    /// Failures of individual devices or tasks are logged, not returned.
    pub async fn shutdown(mut self) -> Result<()> {
        let mut device_failures = 0;
        for (slot, device) in &self.devices {
            if let Err(e) = device.shutdown().await {
                warn!("Device {slot} did not shut down cleanly: {e}");
                device_failures += 1;
            }
        }

        self.tasks.abort_all();

        let mut error_count = 0;
        let mut panic_count = 0;
        while let Some(result) = self.tasks.join_next().await {
            match Self::classify_task_result(result) {
                TaskTermination::Success | TaskTermination::Cancelled => {}
                TaskTermination::Error => error_count += 1,
                TaskTermination::Panic => panic_count += 1,
            }
        }

        if device_failures + error_count + panic_count > 0 {
            warn!(
                "Manager stopped with {device_failures} device failures, \
                 {error_count} task errors and {panic_count} task panics"
            );
        } else {
            info!("Manager stopped, {} devices released", self.devices.len());
        }
        Ok(())
    }

    fn classify_task_result(
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> TaskTermination {
        match result {
            Ok(Ok(())) => TaskTermination::Success,
            Ok(Err(_)) => TaskTermination::Error,
            Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
            Err(_) => TaskTermination::Panic,
        }
    }
}

/// Task termination classification for shutdown handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Error,
    /// Aborted by shutdown.
    Cancelled,
    Panic,
}

fn find_slot<'a>(devices: &'a [(String, DeviceHandle)], slot: &str) -> Option<&'a DeviceHandle> {
    devices
        .iter()
        .find(|(name, _)| name == slot)
        .map(|(_, device)| device)
}

/// Owns the devices of one kiosk.
///
/// # Lifecycle
///
/// 1. Create the manager and build devices against its [`registry`](Self::registry)
/// 2. Register each device under a slot name
/// 3. Call [`start`](Self::start) to initialize every device and get the event handle
/// 4. Receive events until done, then [`shutdown`](ManagerHandle::shutdown)
#[derive(Debug, Default)]
pub struct DeviceManager {
    registry: Arc<EndpointRegistry>,
    devices: Vec<(String, DeviceHandle)>,
}

impl DeviceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manage devices claiming endpoints from `registry`.
    #[must_use]
    pub fn with_registry(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry,
            devices: Vec::new(),
        }
    }

    /// Endpoint registry shared by the managed devices.
    #[must_use]
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        self.registry.clone()
    }

    /// Register a device under `slot`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the slot is taken.
    pub fn register(&mut self, slot: impl Into<String>, core: DeviceCore) -> Result<DeviceHandle> {
        let slot = slot.into();
        if find_slot(&self.devices, &slot).is_some() {
            return Err(HardwareError::configuration(format!(
                "device slot {slot} is already registered"
            )));
        }

        let device = DeviceHandle::new(core);
        debug!("Device {} registered as {slot}", device.name());
        self.devices.push((slot, device.clone()));
        Ok(device)
    }

    #[must_use]
    pub fn device(&self, slot: &str) -> Option<&DeviceHandle> {
        find_slot(&self.devices, slot)
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        stats_of(self.devices.iter().map(|(_, device)| device))
    }

    /// Subscribe to every device, start forwarding and initialize all
    /// devices.
    ///
    /// # Errors
    ///
    /// Returns an error if a device thread cannot be started.
    pub async fn start(self) -> Result<ManagerHandle> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let mut tasks = JoinSet::new();

        for (slot, device) in &self.devices {
            let status = device.subscribe(Signal::Status, MANAGER_RECEIVER);
            let initialized = device.subscribe(Signal::Initialized, MANAGER_RECEIVER);
            let (Some(status), Some(initialized)) = (status, initialized) else {
                return Err(HardwareError::configuration(format!(
                    "device {slot} is already managed"
                )));
            };

            tasks.spawn(Self::forward_task(
                slot.clone(),
                status,
                initialized,
                event_tx.clone(),
            ));
        }

        for (slot, device) in &self.devices {
            info!("Initializing {slot} ({})", device.device_type());
            device.initialize().await?;
        }

        Ok(ManagerHandle {
            event_rx,
            tasks,
            devices: self.devices,
        })
    }

    async fn forward_task(
        slot: String,
        mut status: mpsc::UnboundedReceiver<DeviceEvent>,
        mut initialized: mpsc::UnboundedReceiver<DeviceEvent>,
        tx: mpsc::Sender<ManagerEvent>,
    ) -> Result<()> {
        loop {
            let event = tokio::select! {
                Some(event) = status.recv() => event,
                Some(event) = initialized.recv() => event,
                else => break,
            };

            let event = ManagerEvent {
                slot: slot.clone(),
                event,
            };
            if tx.send(event).await.is_err() {
                // Host dropped the event stream
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceBuilder;
    use crate::mock::{MockDriver, MockDriverHandle};
    use crate::status::codes::error;
    use crate::types::DeviceType;
    use kiosk_core::{DeviceConfig, WarningLevel};
    use std::time::Duration;

    fn core(name: &str, device_type: DeviceType) -> (DeviceCore, MockDriverHandle) {
        let (driver, control) = MockDriver::new(device_type);
        let core = DeviceBuilder::new(DeviceConfig::new(name), driver)
            .build()
            .unwrap();
        (core, control)
    }

    async fn next_event(handle: &mut ManagerHandle) -> ManagerEvent {
        tokio::time::timeout(Duration::from_secs(5), handle.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicate_slot() {
        let mut manager = DeviceManager::new();
        let (printer, _) = core("Printer", DeviceType::Printer);
        let (other, _) = core("Printer 2", DeviceType::Printer);

        manager.register("printer", printer).unwrap();
        assert!(matches!(
            manager.register("printer", other),
            Err(HardwareError::ConfigurationError { .. })
        ));
        assert_eq!(manager.stats().devices, 1);
    }

    #[tokio::test]
    async fn test_manager_forwards_tagged_events() {
        let mut manager = DeviceManager::new();
        let (printer, _) = core("Printer", DeviceType::Printer);
        let (reader, _) = core("Reader", DeviceType::CardReader);
        manager.register("printer", printer).unwrap();
        manager.register("reader", reader).unwrap();

        let mut handle = manager.start().await.unwrap();

        let mut initialized = Vec::new();
        while initialized.len() < 2 {
            let event = next_event(&mut handle).await;
            if event.event == DeviceEvent::Initialized {
                initialized.push(event.slot);
            }
        }
        initialized.sort();
        assert_eq!(initialized, vec!["printer", "reader"]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_manager_reports_disconnection() {
        let mut manager = DeviceManager::new();
        let (printer, control) = core("Printer", DeviceType::Printer);
        manager.register("printer", printer).unwrap();

        let mut handle = manager.start().await.unwrap();
        let device = handle.device("printer").unwrap().clone();
        device.snapshot().await.unwrap();

        control.set_connected(false);
        let collection = device.poll().await.unwrap();
        assert!(collection.contains_code(error::NOT_AVAILABLE));

        // Initialization signals may still be queued ahead of the error
        loop {
            let event = next_event(&mut handle).await;
            assert_eq!(event.slot, "printer");
            if let DeviceEvent::Status(signal) = event.event
                && signal.level == WarningLevel::Error
            {
                break;
            }
        }

        device.snapshot().await.unwrap();
        assert_eq!(handle.stats().connected, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_devices() {
        let mut manager = DeviceManager::new();
        let (printer, control) = core("Printer", DeviceType::Printer);
        let device = manager.register("printer", printer).unwrap();

        let handle = manager.start().await.unwrap();
        assert_eq!(device.snapshot().await.unwrap().init_state, InitState::Success);
        assert_eq!(handle.stats().initialized, 1);

        handle.shutdown().await.unwrap();
        assert!(control.release_calls() >= 1);
        assert!(device.poll().await.is_err());
    }

    #[tokio::test]
    async fn test_device_cannot_join_two_managers() {
        let (printer, _) = core("Printer", DeviceType::Printer);
        let device = DeviceHandle::new(printer);
        let _status = device.subscribe(Signal::Status, MANAGER_RECEIVER);

        let manager = DeviceManager {
            registry: EndpointRegistry::shared(),
            devices: vec![("printer".to_string(), device.clone())],
        };
        assert!(manager.start().await.is_err());
        device.shutdown().await.unwrap();
    }
}
