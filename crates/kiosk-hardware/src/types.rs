//! Common types shared across device implementations.
//!
//! Device categories, identity information reported by drivers, and the
//! persistent flags the status pipeline turns into warnings.

use serde::{Deserialize, Serialize};

/// Category of a kiosk peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceType {
    Printer,
    CardReader,
    Dispenser,
    Scanner,
    Modem,
    CashAcceptor,
    Watchdog,
    Other,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Printer => write!(f, "Printer"),
            Self::CardReader => write!(f, "Card reader"),
            Self::Dispenser => write!(f, "Dispenser"),
            Self::Scanner => write!(f, "Scanner"),
            Self::Modem => write!(f, "Modem"),
            Self::CashAcceptor => write!(f, "Cash acceptor"),
            Self::Watchdog => write!(f, "Watchdog"),
            Self::Other => write!(f, "Device"),
        }
    }
}

/// Identity of a device as established by identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Model name, or the configured name until the model is known.
    pub name: String,

    /// Optional device serial number.
    pub serial_number: Option<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with the display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial_number: None,
            firmware_version: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::new(kiosk_core::constants::DEFAULT_DEVICE_NAME)
    }
}

/// Persistent conditions found during identification and initialization.
///
/// Status cleanup turns each of these into a warning (or, for the
/// initialization error, an error) on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFlags {
    /// The model was confirmed by the driver.
    pub verified: bool,

    /// The model is supported by the driver.
    pub model_compatibility: bool,

    /// The firmware should be updated.
    pub old_firmware: bool,

    /// The device asked for a reboot.
    pub need_reboot: bool,

    /// Sticky initialization error, set by drivers.
    pub initialization_error: bool,
}

impl DeviceFlags {
    /// Reset the identification flags before a new identification.
    pub fn reset_identification(&mut self) {
        self.verified = true;
        self.model_compatibility = true;
        self.old_firmware = false;
    }
}

impl Default for DeviceFlags {
    fn default() -> Self {
        Self {
            verified: true,
            model_compatibility: true,
            old_firmware: false,
            need_reboot: false,
            initialization_error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_builder() {
        let info = DeviceInfo::new("TM-T20")
            .with_serial_number("X4Y2000123")
            .with_firmware_version("30.11");

        assert_eq!(info.name, "TM-T20");
        assert_eq!(info.serial_number, Some("X4Y2000123".to_string()));
        assert_eq!(info.firmware_version, Some("30.11".to_string()));
    }

    #[test]
    fn test_device_info_default_name() {
        let info = DeviceInfo::default();
        assert_eq!(info.name, "Unknown device");
        assert_eq!(info.firmware_version, None);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType::Printer.to_string(), "Printer");
        assert_eq!(DeviceType::CardReader.to_string(), "Card reader");
        assert_eq!(DeviceType::Other.to_string(), "Device");
    }

    #[test]
    fn test_device_type_serialization() {
        let json = serde_json::to_string(&DeviceType::CashAcceptor).unwrap();
        assert_eq!(json, "\"cash_acceptor\"");
        let deserialized: DeviceType = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, DeviceType::CashAcceptor);
    }

    #[test]
    fn test_flags_reset_identification_keeps_sticky_flags() {
        let mut flags = DeviceFlags {
            verified: false,
            model_compatibility: false,
            old_firmware: true,
            need_reboot: true,
            initialization_error: true,
        };

        flags.reset_identification();

        assert!(flags.verified);
        assert!(flags.model_compatibility);
        assert!(!flags.old_firmware);
        assert!(flags.need_reboot);
        assert!(flags.initialization_error);
    }
}
