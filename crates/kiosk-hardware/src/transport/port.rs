//! The port abstraction every transport binding drives.

use crate::Result;
use crate::error::HardwareError;
use kiosk_core::DeviceParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Transport family, one endpoint pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// COM/tty ports, identified by port name.
    Serial,
    /// USB devices behind a system driver, identified by device object name.
    Usb,
    /// USB devices driven through libusb, identified by bus and address.
    LibUsb,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [TransportKind::Serial, TransportKind::Usb, TransportKind::LibUsb];
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Usb => write!(f, "USB"),
            Self::LibUsb => write!(f, "LibUSB"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// RTS line behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtsControl {
    Disable,
    Enable,
    /// Hardware flow control.
    Handshake,
}

/// DTR line behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtrControl {
    Disable,
    Enable,
    Handshake,
}

/// Line settings of a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortParameters {
    pub baud_rate: u32,
    pub parity: Parity,
    pub byte_size: u8,
    pub rts: RtsControl,
    pub dtr: DtrControl,
}

impl Default for PortParameters {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            parity: Parity::None,
            byte_size: 8,
            rts: RtsControl::Enable,
            dtr: DtrControl::Enable,
        }
    }
}

impl fmt::Display for PortParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} baud, parity {:?}, {} bits, RTS {:?}, DTR {:?}",
            self.baud_rate, self.parity, self.byte_size, self.rts, self.dtr
        )
    }
}

/// Name of a physical endpoint: a port name, a device object name or a
/// USB bus/address key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An endpoint found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub description: Option<String>,
}

impl EndpointInfo {
    pub fn new(id: impl Into<EndpointId>) -> Self {
        Self {
            id: id.into(),
            vendor_id: None,
            product_id: None,
            description: None,
        }
    }

    /// Set the USB vendor and product identifiers.
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Blocking I/O port owned by one device.
///
/// Ports are only ever driven from their device's worker thread, so every
/// operation is synchronous; a read blocks until data arrives or its
/// timeout fires.
pub trait IoPort: Send + fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Endpoint the port is bound to, if any.
    fn endpoint(&self) -> Option<EndpointId>;

    /// Bind the port to an endpoint. Closes the port if it was open on
    /// another endpoint.
    fn set_endpoint(&mut self, endpoint: &EndpointId) -> Result<()>;

    /// Open the bound endpoint. Opening an open port is a no-op.
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// The bound endpoint is present in the system.
    fn is_exist(&mut self) -> bool;

    /// Something answers on the bound endpoint.
    fn device_connected(&mut self) -> bool;

    /// Read at least `min_size` bytes, or whatever arrived when `timeout` fires.
    fn read(&mut self, timeout: Duration, min_size: usize) -> Result<Vec<u8>>;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Write a request and read the answer.
    fn query(&mut self, request: &[u8], timeout: Duration, min_size: usize) -> Result<Vec<u8>> {
        self.write(request)?;
        self.read(timeout, min_size)
    }

    /// Current line settings; `None` for ports without any.
    fn parameters(&self) -> Option<PortParameters> {
        None
    }

    fn set_parameters(&mut self, _parameters: &PortParameters) -> Result<()> {
        Err(HardwareError::unsupported(format!(
            "{} port has no line settings",
            self.kind()
        )))
    }

    /// Transport-specific configuration (system name, timeouts...).
    fn device_configuration(&self) -> DeviceParameters {
        DeviceParameters::new()
    }

    fn set_device_configuration(&mut self, _configuration: &DeviceParameters) {}

    /// Endpoints of this port's kind currently present in the system.
    fn available_endpoints(&mut self) -> Vec<EndpointInfo> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Serial.to_string(), "Serial");
        assert_eq!(TransportKind::Usb.to_string(), "USB");
        assert_eq!(TransportKind::LibUsb.to_string(), "LibUSB");
    }

    #[test]
    fn test_port_parameters_default_display() {
        let parameters = PortParameters::default();
        assert_eq!(
            parameters.to_string(),
            "9600 baud, parity None, 8 bits, RTS Enable, DTR Enable"
        );
    }

    #[test]
    fn test_endpoint_info_builder() {
        let info = EndpointInfo::new("COM3")
            .with_usb_ids(0x04b8, 0x0e15)
            .with_description("USB serial");

        assert_eq!(info.id.as_str(), "COM3");
        assert_eq!(info.vendor_id, Some(0x04b8));
        assert_eq!(info.product_id, Some(0x0e15));
        assert_eq!(info.description.as_deref(), Some("USB serial"));
    }

    #[test]
    fn test_port_parameters_serialization() {
        let parameters = PortParameters {
            baud_rate: 115_200,
            parity: Parity::Even,
            byte_size: 7,
            rts: RtsControl::Handshake,
            dtr: DtrControl::Disable,
        };

        let json = serde_json::to_string(&parameters).unwrap();
        assert!(json.contains("\"parity\":\"even\""));
        let deserialized: PortParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, parameters);
    }
}
