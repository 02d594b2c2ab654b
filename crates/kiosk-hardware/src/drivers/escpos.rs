//! ESC/POS receipt printer.
//!
//! The model is identified with `GS I 1` (one model id byte) and the state
//! is read with the four `DLE EOT n` real-time status requests. Each status
//! byte is framed by fixed bits (bits 1 and 4 set, bits 0 and 7 clear); a
//! byte that breaks the frame means something else is talking on the port.
//!
//! | Request     | Byte | Bit | Condition                   |
//! |-------------|------|-----|-----------------------------|
//! | `DLE EOT 2` | 1    | 2   | cover is open               |
//! | `DLE EOT 2` | 1    | 5   | printing stopped, no paper  |
//! | `DLE EOT 3` | 2    | 3   | cutter error                |
//! | `DLE EOT 3` | 2    | 5   | unrecoverable error         |
//! | `DLE EOT 3` | 2    | 6   | paper jam (auto-recoverable)|
//! | `DLE EOT 4` | 3    | 2,3 | paper near end              |
//! | `DLE EOT 4` | 3    | 5,6 | paper end                   |

use crate::Result;
use crate::device::{DeviceDriver, DriverContext};
use crate::status::{
    BitmapCodeSpecification, StatusCode, StatusCodes, StatusPolicy, StatusSpecifications,
    codes::error,
};
use crate::types::DeviceType;
use kiosk_core::{DeviceParameters, WarningLevel};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Printer-specific status codes.
pub mod codes {
    use crate::status::StatusCode;

    pub const PAPER_END: StatusCode = StatusCode::new(1000);
    pub const PAPER_NEAR_END: StatusCode = StatusCode::new(1001);
    pub const PAPER_JAM: StatusCode = StatusCode::new(1002);
    pub const CUTTER: StatusCode = StatusCode::new(1003);
}

const GET_MODEL_ID: &[u8] = &[0x1D, 0x49, 0x01];
const GET_FIRMWARE: &[u8] = &[0x1D, 0x49, 0x03];
const INITIALIZE: &[u8] = &[0x1B, 0x40];
const STATUS_REQUESTS: [u8; 4] = [1, 2, 3, 4];

const FRAME_MASK: u8 = 0b1001_0011;
const FRAME_BITS: u8 = 0b0001_0010;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

fn status_request(kind: u8) -> [u8; 3] {
    [0x10, 0x04, kind]
}

/// Model entry of the identification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscPosModel {
    pub name: String,
    pub verified: bool,
}

/// Driver of an ESC/POS receipt printer.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::device::DeviceBuilder;
/// use kiosk_hardware::drivers::EscPosPrinter;
/// use kiosk_hardware::mock::MockPort;
/// use kiosk_hardware::transport::{EndpointRegistry, SerialSettings, TransportKind};
/// use kiosk_core::{CallingType, DeviceConfig, InitState};
///
/// let (port, control) = MockPort::new(TransportKind::Serial);
/// control.set_reply(&[0x1D, 0x49, 0x01], &[0x20]);
/// for kind in 1..=4 {
///     control.set_reply(&[0x10, 0x04, kind], &[0x12]);
/// }
///
/// let printer = EscPosPrinter::new().with_model(0x20, "Kiosk 80", true);
/// let mut core = DeviceBuilder::new(DeviceConfig::new("Printer"), printer)
///     .with_serial(SerialSettings::new("COM1"), port, EndpointRegistry::shared())
///     .build()
///     .unwrap();
///
/// core.initialize(CallingType::External);
/// assert_eq!(core.init_state(), InitState::Success);
/// assert_eq!(core.name(), "Kiosk 80");
/// ```
#[derive(Debug, Clone)]
pub struct EscPosPrinter {
    models: BTreeMap<u8, EscPosModel>,
    status_bits: BitmapCodeSpecification,
    timeout: Duration,
    model_id: Option<u8>,
    firmware: Option<String>,
}

impl Default for EscPosPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl EscPosPrinter {
    #[must_use]
    pub fn new() -> Self {
        let mut status_bits = BitmapCodeSpecification::new();
        status_bits.add_status(1, 2, error::COVER_IS_OPENED, "cover is opened");
        status_bits.add_status(1, 5, codes::PAPER_END, "printing stopped by paper end");
        status_bits.add_status(2, 3, codes::CUTTER, "cutter error");
        status_bits.add_status(2, 5, error::MECHANISM, "unrecoverable error");
        status_bits.add_status(2, 6, codes::PAPER_JAM, "auto-recoverable error");
        status_bits.add_status(3, 2, codes::PAPER_NEAR_END, "paper near end");
        status_bits.add_status(3, 3, codes::PAPER_NEAR_END, "paper near end");
        status_bits.add_status(3, 5, codes::PAPER_END, "paper end");
        status_bits.add_status(3, 6, codes::PAPER_END, "paper end");

        Self {
            models: BTreeMap::new(),
            status_bits,
            timeout: DEFAULT_TIMEOUT,
            model_id: None,
            firmware: None,
        }
    }

    /// Recognize model id `id`.
    #[must_use]
    pub fn with_model(mut self, id: u8, name: impl Into<String>, verified: bool) -> Self {
        self.models.insert(
            id,
            EscPosModel {
                name: name.into(),
                verified,
            },
        );
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn query(&self, ctx: &mut DriverContext<'_>, request: &[u8], min_size: usize) -> Result<Vec<u8>> {
        let port = ctx.port()?;
        port.open()?;
        port.query(request, self.timeout, min_size)
    }

    fn read_status_bytes(&self, ctx: &mut DriverContext<'_>) -> Option<Vec<u8>> {
        let mut answer = Vec::with_capacity(STATUS_REQUESTS.len());

        for kind in STATUS_REQUESTS {
            let byte = match self.query(ctx, &status_request(kind), 1) {
                Ok(bytes) => bytes.first().copied()?,
                Err(e) => {
                    debug!("Status request {kind} failed: {e}");
                    return None;
                }
            };

            if byte & FRAME_MASK != FRAME_BITS {
                warn!("Status byte {byte:#04x} for request {kind} is not framed");
                return None;
            }
            answer.push(byte);
        }
        Some(answer)
    }
}

impl DeviceDriver for EscPosPrinter {
    fn device_type(&self) -> DeviceType {
        DeviceType::Printer
    }

    fn is_connected(&mut self, ctx: &mut DriverContext<'_>) -> bool {
        let id = match self.query(ctx, GET_MODEL_ID, 1) {
            Ok(answer) => match answer.as_slice() {
                [id] => *id,
                [] => return false,
                _ => {
                    debug!("Unexpected model id answer {answer:02x?}");
                    return false;
                }
            },
            Err(e) => {
                debug!("Model id request failed: {e}");
                return false;
            }
        };
        self.model_id = Some(id);

        match self.models.get(&id) {
            Some(model) => {
                ctx.set_model(model.name.as_str());
                ctx.flags.verified = model.verified;
            }
            None => {
                info!("Unknown ESC/POS model id {id:#04x}");
                ctx.set_model(format!("ESC/POS printer {id:#04x}"));
                ctx.flags.verified = false;
            }
        }

        self.firmware = self
            .query(ctx, GET_FIRMWARE, 1)
            .ok()
            .filter(|answer| !answer.is_empty())
            .map(|answer| String::from_utf8_lossy(&answer).trim().to_string());
        ctx.info.firmware_version = self.firmware.clone();
        true
    }

    fn get_status(&mut self, ctx: &mut DriverContext<'_>, codes: &mut StatusCodes) -> bool {
        let Some(answer) = self.read_status_bytes(ctx) else {
            return false;
        };

        self.status_bits.decode(&answer, codes);
        let active = self.status_bits.describe(&answer);
        if !active.is_empty() {
            debug!("Printer reports: {}", active.join(", "));
        }
        true
    }

    fn update_parameters(&mut self, ctx: &mut DriverContext<'_>) -> bool {
        let written = ctx.port().and_then(|port| {
            port.open()?;
            port.write(INITIALIZE)
        });
        match written {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot initialize the printer: {e}");
                false
            }
        }
    }

    fn configure(&mut self, specifications: &mut StatusSpecifications, _policy: &mut StatusPolicy) {
        let mut add = |code: StatusCode, level, description: &str, translation: &str| {
            specifications.insert(code, level, description, translation);
        };
        add(codes::PAPER_END, WarningLevel::Error, "paper end", "Out of paper");
        add(codes::PAPER_NEAR_END, WarningLevel::Warning, "paper near end", "Paper is running out");
        add(codes::PAPER_JAM, WarningLevel::Error, "paper jam", "Paper is jammed");
        add(codes::CUTTER, WarningLevel::Error, "cutter", "Cutter error");
    }

    fn release(&mut self, _ctx: &mut DriverContext<'_>) {
        self.model_id = None;
    }

    fn device_data(&self, data: &mut DeviceParameters) {
        if let Some(id) = self.model_id {
            data.set("model_id", format!("{id:#04x}"));
        }
        if let Some(firmware) = &self.firmware {
            data.extend_entry("firmware", "ROM", firmware);
        }
    }
}
