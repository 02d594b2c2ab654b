use crate::constants::VERSION_BUILD_MARKER;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a status code.
///
/// Ordered so that the worst observed level is simply the maximum:
/// `Error > Warning > Ok`.
///
/// # Examples
///
/// ```
/// use kiosk_core::WarningLevel;
///
/// let worst = [WarningLevel::Ok, WarningLevel::Error, WarningLevel::Warning]
///     .into_iter()
///     .max();
/// assert_eq!(worst, Some(WarningLevel::Error));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    Ok,
    Warning,
    Error,
}

impl WarningLevel {
    /// All levels from the mildest to the worst.
    pub const ALL: [WarningLevel; 3] = [WarningLevel::Ok, WarningLevel::Warning, WarningLevel::Error];

    /// Returns `true` if the level is `Error`.
    #[inline]
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, WarningLevel::Error)
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WarningLevel::Ok => write!(f, "OK"),
            WarningLevel::Warning => write!(f, "Warning"),
            WarningLevel::Error => write!(f, "Error"),
        }
    }
}

/// Initialization state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    /// Never initialized, or released.
    #[default]
    NotStarted,
    InProgress,
    Success,
    Fail,
}

impl InitState {
    /// Returns `true` once an initialization attempt has finished either way.
    #[inline]
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, InitState::Success | InitState::Fail)
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InitState::NotStarted => write!(f, "not started"),
            InitState::InProgress => write!(f, "in progress"),
            InitState::Success => write!(f, "success"),
            InitState::Fail => write!(f, "fail"),
        }
    }
}

/// Origin of a lifecycle call.
///
/// Calls coming from the device itself (re-initialization after a
/// recovered fault) are internal; calls from the host are external.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingType {
    #[default]
    External,
    Internal,
}

impl CallingType {
    /// Parameter value representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallingType::External => "external",
            CallingType::Internal => "internal",
        }
    }
}

impl fmt::Display for CallingType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "external" => Ok(CallingType::External),
            "internal" => Ok(CallingType::Internal),
            other => Err(Error::InvalidCallingType(other.to_string())),
        }
    }
}

/// Kind of an emitted status.
///
/// Only `Actual` statuses describe the device itself; the others are shown
/// to the user but never count as the last known warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedStatus {
    #[default]
    Actual,
    /// Maintenance information (firmware updates and such).
    Service,
    /// Progress shown by the user interface, e.g. "initializing".
    Interface,
}

impl ExtendedStatus {
    /// Returns `true` if this status updates the last emitted warning level.
    #[inline]
    #[must_use]
    pub fn updates_warning_level(self) -> bool {
        self < ExtendedStatus::Service
    }
}

/// Strip the `" build ..."` suffix from a version string.
///
/// # Examples
///
/// ```
/// use kiosk_core::release_version;
///
/// assert_eq!(release_version("2.4.1 build 77"), "2.4.1");
/// assert_eq!(release_version(" 2.4.1 "), "2.4.1");
/// ```
#[must_use]
pub fn release_version(version: &str) -> &str {
    version
        .split(VERSION_BUILD_MARKER)
        .next()
        .unwrap_or(version)
        .trim()
}

/// Returns `true` if two version strings differ once build suffixes are ignored.
#[must_use]
pub fn versions_mismatch(left: &str, right: &str) -> bool {
    release_version(left) != release_version(right)
}
