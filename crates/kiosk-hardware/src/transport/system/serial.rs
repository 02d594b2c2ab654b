//! Serial port backed by the `serialport` crate.

use crate::Result;
use crate::error::HardwareError;
use crate::transport::{
    DtrControl, EndpointId, EndpointInfo, IoPort, Parity, PortParameters, RtsControl,
    TransportKind,
};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Timeout of a single blocking read inside [`IoPort::read`].
const READ_SLICE: Duration = Duration::from_millis(20);

/// An OS serial port (COM port or tty).
pub struct SystemSerialPort {
    endpoint: Option<EndpointId>,
    parameters: PortParameters,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl std::fmt::Debug for SystemSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSerialPort")
            .field("endpoint", &self.endpoint)
            .field("parameters", &self.parameters)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SystemSerialPort {
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoint: None,
            parameters: PortParameters::default(),
            port: None,
        }
    }

    fn apply(port: &mut dyn serialport::SerialPort, parameters: &PortParameters) -> Result<()> {
        port.set_baud_rate(parameters.baud_rate).map_err(map_error)?;
        port.set_parity(to_parity(parameters.parity)).map_err(map_error)?;
        port.set_data_bits(to_data_bits(parameters.byte_size)?)
            .map_err(map_error)?;

        let hardware_flow =
            parameters.rts == RtsControl::Handshake || parameters.dtr == DtrControl::Handshake;
        port.set_flow_control(if hardware_flow {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        })
        .map_err(map_error)?;

        if parameters.rts != RtsControl::Handshake {
            port.write_request_to_send(parameters.rts == RtsControl::Enable)
                .map_err(map_error)?;
        }
        if parameters.dtr != DtrControl::Handshake {
            port.write_data_terminal_ready(parameters.dtr == DtrControl::Enable)
                .map_err(map_error)?;
        }
        Ok(())
    }
}

impl Default for SystemSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPort for SystemSerialPort {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
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
        if self.port.is_some() {
            return Ok(());
        }
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| HardwareError::configuration("serial port name is not set"))?;

        let mut port = serialport::new(endpoint.as_str(), self.parameters.baud_rate)
            .timeout(READ_SLICE)
            .open()
            .map_err(map_error)?;
        Self::apply(port.as_mut(), &self.parameters)?;

        debug!("Serial port {endpoint} opened");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some()
            && let Some(endpoint) = &self.endpoint
        {
            debug!("Serial port {endpoint} closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn is_exist(&mut self) -> bool {
        let Some(endpoint) = &self.endpoint else {
            return false;
        };
        serialport::available_ports()
            .map(|ports| ports.iter().any(|port| port.port_name == endpoint.as_str()))
            .unwrap_or(false)
    }

    fn device_connected(&mut self) -> bool {
        self.is_exist()
    }

    fn read(&mut self, timeout: Duration, min_size: usize) -> Result<Vec<u8>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected("serial port is closed"))?;

        let started = Instant::now();
        let mut answer = Vec::new();
        let mut buffer = [0u8; 256];

        while answer.len() < min_size.max(1) && started.elapsed() < timeout {
            match port.read(&mut buffer) {
                Ok(0) => {}
                Ok(count) => answer.extend_from_slice(&buffer[..count]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }

        trace!("<< {:02X?}", answer);
        Ok(answer)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected("serial port is closed"))?;

        trace!(">> {:02X?}", data);
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn parameters(&self) -> Option<PortParameters> {
        Some(self.parameters)
    }

    fn set_parameters(&mut self, parameters: &PortParameters) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            Self::apply(port.as_mut(), parameters)?;
        }
        self.parameters = *parameters;
        Ok(())
    }

    fn available_endpoints(&mut self) -> Vec<EndpointInfo> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!("Serial port enumeration failed: {e}");
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .map(|port| {
                let info = EndpointInfo::new(port.port_name);
                match port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => {
                        let info = info.with_usb_ids(usb.vid, usb.pid);
                        match usb.product {
                            Some(product) => info.with_description(product),
                            None => info,
                        }
                    }
                    _ => info,
                }
            })
            .collect()
    }
}

fn to_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_data_bits(byte_size: u8) -> Result<serialport::DataBits> {
    match byte_size {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(HardwareError::configuration(format!(
            "unsupported byte size {other}"
        ))),
    }
}

fn map_error(error: serialport::Error) -> HardwareError {
    match error.kind() {
        serialport::ErrorKind::NoDevice => HardwareError::disconnected(error.to_string()),
        serialport::ErrorKind::InvalidInput => HardwareError::configuration(error.to_string()),
        _ => HardwareError::communication(error.to_string()),
    }
}
