//! USB port backed by libusb through the `rusb` crate.
//!
//! Endpoints are keyed `"<bus>:<address>"`. The first interface is claimed
//! and its first bulk IN/OUT endpoint pair carries the traffic.

use crate::Result;
use crate::error::HardwareError;
use crate::transport::{EndpointId, EndpointInfo, IoPort, TransportKind};
use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType};
use std::time::Duration;
use tracing::{debug, trace, warn};

const INTERFACE: u8 = 0;
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

struct OpenDevice {
    handle: DeviceHandle<GlobalContext>,
    endpoint_in: u8,
    endpoint_out: u8,
}

/// A USB device driven through libusb bulk transfers.
#[derive(Default)]
pub struct LibUsbPort {
    endpoint: Option<EndpointId>,
    device: Option<OpenDevice>,
}

impl std::fmt::Debug for LibUsbPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibUsbPort")
            .field("endpoint", &self.endpoint)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl LibUsbPort {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(device: &Device<GlobalContext>) -> String {
        format!("{}:{}", device.bus_number(), device.address())
    }

    fn find(&self) -> Option<Device<GlobalContext>> {
        let endpoint = self.endpoint.as_ref()?;
        rusb::devices()
            .ok()?
            .iter()
            .find(|device| Self::key(device) == endpoint.as_str())
    }

    fn bulk_endpoints(device: &Device<GlobalContext>) -> Result<(u8, u8)> {
        let config = device.active_config_descriptor().map_err(map_error)?;
        let mut endpoint_in = None;
        let mut endpoint_out = None;

        for interface in config.interfaces().filter(|i| i.number() == INTERFACE) {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => {
                            endpoint_in.get_or_insert(endpoint.address());
                        }
                        Direction::Out => {
                            endpoint_out.get_or_insert(endpoint.address());
                        }
                    }
                }
            }
        }

        match (endpoint_in, endpoint_out) {
            (Some(endpoint_in), Some(endpoint_out)) => Ok((endpoint_in, endpoint_out)),
            _ => Err(HardwareError::unsupported("device has no bulk endpoint pair")),
        }
    }

    fn opened(&mut self) -> Result<&mut OpenDevice> {
        self.device
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected("USB device is closed"))
    }
}

impl IoPort for LibUsbPort {
    fn kind(&self) -> TransportKind {
        TransportKind::LibUsb
    }

    fn endpoint(&self) -> Option<EndpointId> {
        self.endpoint.clone()
    }

    fn set_endpoint(&mut self, endpoint: &EndpointId) -> Result<()> {
        if self.endpoint.as_ref() != Some(endpoint) {
            self.close()?;
            self.endpoint = Some(endpoint.clone());
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let device = self
            .find()
            .ok_or_else(|| HardwareError::disconnected("USB device not found"))?;
        let (endpoint_in, endpoint_out) = Self::bulk_endpoints(&device)?;

        let mut handle = device.open().map_err(map_error)?;
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {e}");
        }
        handle.claim_interface(INTERFACE).map_err(map_error)?;

        debug!("USB device {} opened", Self::key(&device));
        self.device = Some(OpenDevice {
            handle,
            endpoint_in,
            endpoint_out,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.handle.release_interface(INTERFACE) {
                warn!("Failed to release USB interface: {e}");
            }
            debug!("USB device closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn is_exist(&mut self) -> bool {
        self.find().is_some()
    }

    fn device_connected(&mut self) -> bool {
        self.is_exist()
    }

    fn read(&mut self, timeout: Duration, min_size: usize) -> Result<Vec<u8>> {
        let device = self.opened()?;
        let deadline = std::time::Instant::now() + timeout;
        let mut answer = Vec::new();
        let mut buffer = [0u8; 512];

        while answer.len() < min_size.max(1) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match device.handle.read_bulk(device.endpoint_in, &mut buffer, remaining) {
                Ok(count) => answer.extend_from_slice(&buffer[..count]),
                Err(rusb::Error::Timeout) => break,
                Err(e) => return Err(map_error(e)),
            }
        }

        trace!("<< {:02X?}", answer);
        Ok(answer)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let device = self.opened()?;
        trace!(">> {:02X?}", data);
        device
            .handle
            .write_bulk(device.endpoint_out, data, WRITE_TIMEOUT)
            .map_err(map_error)?;
        Ok(())
    }

    fn available_endpoints(&mut self) -> Vec<EndpointInfo> {
        let devices = match rusb::devices() {
            Ok(devices) => devices,
            Err(e) => {
                debug!("USB enumeration failed: {e}");
                return Vec::new();
            }
        };

        devices
            .iter()
            .filter_map(|device| {
                let descriptor = device.device_descriptor().ok()?;
                Some(
                    EndpointInfo::new(Self::key(&device))
                        .with_usb_ids(descriptor.vendor_id(), descriptor.product_id()),
                )
            })
            .collect()
    }
}

fn map_error(error: rusb::Error) -> HardwareError {
    match error {
        rusb::Error::NoDevice | rusb::Error::NotFound => HardwareError::disconnected(error.to_string()),
        rusb::Error::Busy => HardwareError::port_busy(error.to_string()),
        rusb::Error::Timeout => HardwareError::timeout(0),
        rusb::Error::NotSupported => HardwareError::unsupported(error.to_string()),
        _ => HardwareError::communication(error.to_string()),
    }
}
