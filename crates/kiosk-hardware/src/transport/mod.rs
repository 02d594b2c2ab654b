//! Transport composition.
//!
//! A device talks to its hardware through at most one transport binding.
//! [`TransportBinding`] is a closed set of variants dispatched with a
//! `match`, so adding capabilities to a device never requires a new type
//! per transport.
//!
//! ```text
//!                     ┌─────────────────────┐
//!                     │  EndpointRegistry   │  one pool per TransportKind
//!                     └──────────▲──────────┘
//!                                │ claim / release
//!  DeviceCore ──► TransportBinding ──► IoPort (system or mock)
//!                  None | Serial | Usb | LibUsb
//! ```

mod detect;
mod libusb;
mod port;
mod registry;
mod serial;
#[cfg(any(feature = "hardware-serial", feature = "hardware-usb"))]
pub mod system;
mod usb;

pub use detect::{DetectingCursor, DetectingData, ProductData};
pub use libusb::LibUsbBinding;
pub use port::{
    DtrControl, EndpointId, EndpointInfo, IoPort, Parity, PortParameters, RtsControl,
    TransportKind,
};
pub use registry::{EndpointClaim, EndpointRegistry, EndpointState};
pub use serial::{SerialBinding, SerialParameterSpace, SerialSettings};
pub use usb::{UsbBinding, UsbSettings};

use crate::status::{StatusCodes, codes::error};
use kiosk_core::DeviceParameters;

/// The transport a device is bound to.
#[derive(Debug, Default)]
#[non_exhaustive]
pub enum TransportBinding {
    /// No port: the driver reaches the device some other way.
    #[default]
    None,
    Serial(SerialBinding),
    Usb(UsbBinding),
    LibUsb(LibUsbBinding),
}

impl TransportBinding {
    #[must_use]
    pub fn kind(&self) -> Option<TransportKind> {
        match self {
            Self::None => None,
            Self::Serial(_) => Some(TransportKind::Serial),
            Self::Usb(_) => Some(TransportKind::Usb),
            Self::LibUsb(_) => Some(TransportKind::LibUsb),
        }
    }

    /// The port to talk through, if this binding has one.
    pub fn port(&mut self) -> Option<&mut dyn IoPort> {
        match self {
            Self::None => None,
            Self::Serial(binding) => Some(binding.port()),
            Self::Usb(binding) => binding.endpoints().port(),
            Self::LibUsb(binding) => binding.endpoints().port(),
        }
    }

    /// Whether the port can be opened at all, regardless of what answers
    /// on it.
    pub fn check_connection_ability(&mut self) -> bool {
        match self {
            Self::None => true,
            Self::Serial(binding) => binding.check_connection_ability(),
            Self::Usb(binding) => binding.endpoints().check_connection_ability(),
            Self::LibUsb(binding) => binding.endpoints().check_connection_ability(),
        }
    }

    /// Apply device parameters before initialization.
    pub fn prepare(&mut self, parameters: &DeviceParameters) {
        if let Self::Serial(binding) = self {
            binding.prepare(parameters);
        }
    }

    /// Line settings to try during identification; empty for transports
    /// without line settings.
    #[must_use]
    pub fn parameter_candidates(&self) -> Vec<PortParameters> {
        match self {
            Self::Serial(binding) => binding.parameter_candidates(),
            _ => Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns the port's error if the settings cannot be applied.
    pub fn apply_parameters(&mut self, parameters: &PortParameters) -> crate::Result<()> {
        match self {
            Self::Serial(binding) => binding.apply_parameters(parameters),
            _ => Ok(()),
        }
    }

    /// Close the port and return the endpoint to the pool.
    pub fn release(&mut self) {
        match self {
            Self::None => {}
            Self::Serial(binding) => binding.release(),
            Self::Usb(binding) => binding.endpoints().release(),
            Self::LibUsb(binding) => binding.endpoints().release(),
        }
    }

    /// Codes the status buffer may mask for this transport.
    #[must_use]
    pub fn replaceable_codes(&self) -> StatusCodes {
        match self {
            Self::Usb(_) | Self::LibUsb(_) => [error::POWER_SUPPLY].into(),
            _ => StatusCodes::new(),
        }
    }

    /// React to freshly published codes.
    pub fn on_status(&mut self, codes: &StatusCodes) {
        match self {
            Self::Usb(binding) => binding.endpoints().on_status(codes),
            Self::LibUsb(binding) => binding.endpoints().on_status(codes),
            _ => {}
        }
    }

    pub fn environment_changed(&mut self) -> bool {
        match self {
            Self::Serial(binding) => binding.environment_changed(),
            _ => false,
        }
    }

    /// Start walking free endpoints. Returns the candidate count.
    pub fn begin_detecting(&mut self) -> usize {
        match self {
            Self::None => 0,
            Self::Serial(binding) => binding.begin_detecting(),
            Self::Usb(binding) => binding.endpoints().begin_detecting(),
            Self::LibUsb(binding) => binding.endpoints().begin_detecting(),
        }
    }

    /// Claim and open the next free endpoint.
    pub fn move_next(&mut self) -> bool {
        match self {
            Self::None => false,
            Self::Serial(binding) => binding.move_next(),
            Self::Usb(binding) => binding.endpoints().move_next(),
            Self::LibUsb(binding) => binding.endpoints().move_next(),
        }
    }

    /// Keep the endpoint the device was found on.
    pub fn claim_current(&mut self) {
        match self {
            Self::None => {}
            Self::Serial(binding) => binding.claim_current(),
            Self::Usb(binding) => binding.endpoints().claim_current(),
            Self::LibUsb(binding) => binding.endpoints().claim_current(),
        }
    }

    /// Product matched by USB identity, if any.
    #[must_use]
    pub fn detected_product(&self) -> Option<&ProductData> {
        match self {
            Self::Usb(binding) => binding.product(),
            Self::LibUsb(binding) => binding.product(),
            _ => None,
        }
    }

    /// Transport entries for the device data map.
    #[must_use]
    pub fn device_data(&self) -> DeviceParameters {
        match self {
            Self::None => DeviceParameters::new(),
            Self::Serial(binding) => binding.device_data(),
            Self::Usb(binding) => binding.endpoints_ref().device_data(),
            Self::LibUsb(binding) => binding.endpoints_ref().device_data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;
    use uuid::Uuid;

    #[test]
    fn test_none_binding() {
        let mut binding = TransportBinding::None;

        assert!(binding.kind().is_none());
        assert!(binding.port().is_none());
        assert!(binding.check_connection_ability());
        assert!(binding.parameter_candidates().is_empty());
        assert!(binding.replaceable_codes().is_empty());
        assert!(!binding.move_next());
        assert!(binding.device_data().is_empty());
    }

    #[test]
    fn test_usb_replaceable_power_supply() {
        let (port, _handle) = MockPort::new(TransportKind::Usb);
        let binding = TransportBinding::Usb(UsbBinding::new(
            UsbSettings::default(),
            Box::new(port),
            EndpointRegistry::shared(),
            Uuid::new_v4(),
        ));

        assert_eq!(binding.kind(), Some(TransportKind::Usb));
        assert!(binding.replaceable_codes().contains(&error::POWER_SUPPLY));
    }

    #[test]
    fn test_serial_binding_dispatch() {
        let (port, handle) = MockPort::new(TransportKind::Serial);
        let mut binding = TransportBinding::Serial(SerialBinding::new(
            SerialSettings::new("COM2"),
            Box::new(port),
            EndpointRegistry::shared(),
            Uuid::new_v4(),
        ));

        assert!(binding.replaceable_codes().is_empty());
        assert_eq!(binding.parameter_candidates().len(), 1);
        assert!(binding.check_connection_ability());
        assert!(handle.is_open());
        assert_eq!(binding.port().unwrap().kind(), TransportKind::Serial);

        binding.release();
        assert!(!handle.is_open());
    }
}
