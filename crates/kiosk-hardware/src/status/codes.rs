//! Status codes and their specification table.
//!
//! A [`StatusCode`] names one atomic device condition. Its severity,
//! technical description and user-facing translation come from a
//! [`StatusSpecifications`] lookup, so severity is always a pure function
//! of the code. Codes shared by every device are grouped by severity in the
//! [`ok`], [`warning`] and [`error`] modules; drivers register their own
//! codes on top.
//!
//! # Examples
//!
//! ```
//! use kiosk_core::WarningLevel;
//! use kiosk_hardware::status::{StatusCode, StatusSpecifications, codes};
//!
//! let mut specifications = StatusSpecifications::default();
//! assert_eq!(specifications.level(codes::error::NOT_AVAILABLE), WarningLevel::Error);
//!
//! const PAPER_NEAR_END: StatusCode = StatusCode::new(1100);
//! specifications.insert(PAPER_NEAR_END, WarningLevel::Warning, "paper near end", "Paper is running out");
//! assert_eq!(specifications.translation(PAPER_NEAR_END), "Paper is running out");
//! ```

use kiosk_core::WarningLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of one atomic device condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

impl StatusCode {
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

/// OK-level codes.
pub mod ok {
    use super::StatusCode;

    pub const OK: StatusCode = StatusCode::new(0);
    pub const BUSY: StatusCode = StatusCode::new(1);
    pub const INITIALIZATION: StatusCode = StatusCode::new(2);
    pub const UNKNOWN: StatusCode = StatusCode::new(3);
}

/// Warning-level codes.
pub mod warning {
    use super::StatusCode;

    pub const UNKNOWN: StatusCode = StatusCode::new(100);
    pub const OPERATION_ERROR: StatusCode = StatusCode::new(101);
    pub const FIRMWARE: StatusCode = StatusCode::new(102);
    pub const NEED_REBOOT: StatusCode = StatusCode::new(103);
    pub const MODEL_NOT_VERIFIED: StatusCode = StatusCode::new(104);
    pub const MODEL_NOT_COMPATIBLE: StatusCode = StatusCode::new(105);
    pub const COMPATIBILITY: StatusCode = StatusCode::new(106);
    pub const THIRD_PARTY_DRIVER: StatusCode = StatusCode::new(107);
    pub const DEVELOPING: StatusCode = StatusCode::new(108);
    pub const UNKNOWN_DATA_EXCHANGE: StatusCode = StatusCode::new(109);
    pub const BOOT_FIRMWARE: StatusCode = StatusCode::new(110);
    pub const WRONG_SWITCHES_CONFIG: StatusCode = StatusCode::new(111);
}

/// Error-level codes.
pub mod error {
    use super::StatusCode;

    pub const UNKNOWN: StatusCode = StatusCode::new(200);
    pub const NOT_AVAILABLE: StatusCode = StatusCode::new(201);
    pub const INITIALIZATION: StatusCode = StatusCode::new(202);
    pub const THIRD_PARTY_DRIVER_FAIL: StatusCode = StatusCode::new(203);
    pub const THIRD_PARTY_DRIVER: StatusCode = StatusCode::new(204);
    pub const POWER_SUPPLY: StatusCode = StatusCode::new(205);
    pub const COVER_IS_OPENED: StatusCode = StatusCode::new(206);
    pub const MEMORY_STORAGE: StatusCode = StatusCode::new(207);
    pub const MECHANISM: StatusCode = StatusCode::new(208);
    pub const MECHANISM_POSITION: StatusCode = StatusCode::new(209);
    pub const FIRMWARE: StatusCode = StatusCode::new(210);
    pub const TEMPERATURE: StatusCode = StatusCode::new(211);
    pub const ELECTRONIC: StatusCode = StatusCode::new(212);
}

/// Static description of one status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSpecification {
    pub level: WarningLevel,
    /// Technical description used in logs.
    pub description: String,
    /// Human-readable message shown to the user.
    pub translation: String,
}

impl StatusSpecification {
    pub fn new(
        level: WarningLevel,
        description: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            level,
            description: description.into(),
            translation: translation.into(),
        }
    }
}

/// Lookup table from status code to its specification.
///
/// Codes missing from the table resolve to an Error-level
/// "unknown device code" entry.
#[derive(Debug, Clone)]
pub struct StatusSpecifications {
    table: HashMap<StatusCode, StatusSpecification>,
    fallback: StatusSpecification,
}

impl StatusSpecifications {
    /// Create a table without any registered code.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
            fallback: StatusSpecification::new(
                WarningLevel::Error,
                "unknown device code",
                "Unknown device state",
            ),
        }
    }

    /// Register or replace a code.
    pub fn insert(
        &mut self,
        code: StatusCode,
        level: WarningLevel,
        description: impl Into<String>,
        translation: impl Into<String>,
    ) {
        self.table
            .insert(code, StatusSpecification::new(level, description, translation));
    }

    #[must_use]
    pub fn contains(&self, code: StatusCode) -> bool {
        self.table.contains_key(&code)
    }

    #[must_use]
    pub fn get(&self, code: StatusCode) -> &StatusSpecification {
        self.table.get(&code).unwrap_or(&self.fallback)
    }

    #[must_use]
    pub fn level(&self, code: StatusCode) -> WarningLevel {
        self.get(code).level
    }

    #[must_use]
    pub fn description(&self, code: StatusCode) -> &str {
        &self.get(code).description
    }

    #[must_use]
    pub fn translation(&self, code: StatusCode) -> &str {
        &self.get(code).translation
    }
}

impl Default for StatusSpecifications {
    fn default() -> Self {
        let mut specifications = Self::empty();
        let mut add = |code, level, description: &str, translation: &str| {
            specifications.insert(code, level, description, translation);
        };

        add(ok::OK, WarningLevel::Ok, "OK", "OK");
        add(ok::BUSY, WarningLevel::Ok, "busy", "Device is busy");
        add(ok::INITIALIZATION, WarningLevel::Ok, "initialization", "Initializing");
        add(ok::UNKNOWN, WarningLevel::Ok, "unknown state", "Unknown state");

        add(warning::UNKNOWN, WarningLevel::Warning, "unknown warning", "Unknown warning");
        add(warning::OPERATION_ERROR, WarningLevel::Warning, "operation error", "Operation error");
        add(warning::FIRMWARE, WarningLevel::Warning, "old firmware", "Firmware needs updating");
        add(warning::NEED_REBOOT, WarningLevel::Warning, "need reboot", "Device needs a reboot");
        add(warning::MODEL_NOT_VERIFIED, WarningLevel::Warning, "model is not verified", "Device model is not verified");
        add(warning::MODEL_NOT_COMPATIBLE, WarningLevel::Warning, "model is not compatible", "Device model is not supported by the driver");
        add(warning::COMPATIBILITY, WarningLevel::Warning, "plugin and software versions mismatch", "Driver version does not match the software");
        add(warning::THIRD_PARTY_DRIVER, WarningLevel::Warning, "third-party driver warning", "Third-party driver reports a problem");
        add(warning::DEVELOPING, WarningLevel::Warning, "driver is under development", "Driver is under development");
        add(warning::UNKNOWN_DATA_EXCHANGE, WarningLevel::Warning, "unknown data exchange", "Unexpected data from device");
        add(warning::BOOT_FIRMWARE, WarningLevel::Warning, "boot firmware", "Device is in boot mode");
        add(warning::WRONG_SWITCHES_CONFIG, WarningLevel::Warning, "wrong switches configuration", "Wrong switches configuration");

        add(error::UNKNOWN, WarningLevel::Error, "unknown error", "Unknown error");
        add(error::NOT_AVAILABLE, WarningLevel::Error, "not available", "Device is not available");
        add(error::INITIALIZATION, WarningLevel::Error, "initialization error", "Initialization failed");
        add(error::THIRD_PARTY_DRIVER_FAIL, WarningLevel::Error, "third-party driver failure", "Third-party driver failed");
        add(error::THIRD_PARTY_DRIVER, WarningLevel::Error, "third-party driver error", "Third-party driver error");
        add(error::POWER_SUPPLY, WarningLevel::Error, "power supply", "Power supply problem");
        add(error::COVER_IS_OPENED, WarningLevel::Error, "cover is opened", "Cover is open");
        add(error::MEMORY_STORAGE, WarningLevel::Error, "memory storage", "Memory storage error");
        add(error::MECHANISM, WarningLevel::Error, "mechanism", "Mechanism error");
        add(error::MECHANISM_POSITION, WarningLevel::Error, "mechanism position", "Mechanism is out of position");
        add(error::FIRMWARE, WarningLevel::Error, "firmware error", "Firmware error");
        add(error::TEMPERATURE, WarningLevel::Error, "temperature", "Temperature out of range");
        add(error::ELECTRONIC, WarningLevel::Error, "electronic", "Electronics failure");

        specifications
    }
}
