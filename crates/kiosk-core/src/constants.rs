//! Core constants for the kiosk device lifecycle.
//!
//! This module defines the defaults shared by every device instance: status
//! history depth, initialization retry budget, polling and release timings,
//! and the names of the well-known device configuration parameters.
//!
//! # Usage
//!
//! Constants are organized by category for easy discovery:
//!
//! ```
//! use kiosk_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_HISTORY_SIZE, 10);
//!
//! let release_wait = Duration::from_millis(DEFAULT_RELEASE_TIMEOUT_MS);
//! assert_eq!(release_wait.as_secs(), 15);
//! ```

// ============================================================================
// Device Identity
// ============================================================================

/// Name reported by a device before its driver identifies the model.
pub const DEFAULT_DEVICE_NAME: &str = "Unknown device";

/// Separator used when joining translated status messages.
///
/// # Examples
///
/// ```
/// use kiosk_core::constants::STATUS_MESSAGE_SEPARATOR;
///
/// let message = ["Out of paper", "Cover is open"].join(STATUS_MESSAGE_SEPARATOR);
/// assert_eq!(message, "Out of paper; Cover is open");
/// ```
pub const STATUS_MESSAGE_SEPARATOR: &str = "; ";

// ============================================================================
// Status History
// ============================================================================

/// Number of status collection snapshots kept per device.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

// ============================================================================
// Initialization
// ============================================================================

/// How many times parameter updating is attempted during one initialization.
pub const DEFAULT_INITIALIZE_REPEAT_COUNT: u32 = 1;

/// Consecutive bad answers masked by the status buffer. Zero disables it.
pub const DEFAULT_MAX_BAD_ANSWERS: u32 = 0;

// ============================================================================
// Timing
// ============================================================================

/// Default status polling interval in milliseconds.
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1000;

/// Upper bound for waiting on an in-flight poll when polling stops.
///
/// Used by release: the worker finishes the current poll before it stops
/// the timer, and callers wait at most this long for the confirmation.
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 15_000;

/// Default interval between condition checks while waiting for a device.
pub const DEFAULT_WAIT_INTERVAL_MS: u64 = 100;

/// Capacity of a device worker command queue.
pub const COMMAND_QUEUE_SIZE: usize = 64;

// ============================================================================
// Configuration Parameter Names
// ============================================================================

/// Which side started the current call: `"internal"` or `"external"`.
pub const PARAM_CALLING_TYPE: &str = "calling_type";

/// Identified model name of the device.
pub const PARAM_MODEL_NAME: &str = "model_name";

/// Location of the driver plugin, logged with device data.
pub const PARAM_PLUGIN_PATH: &str = "plugin_path";

/// Version of the host software the plugin was built for.
pub const PARAM_PP_VERSION: &str = "pp_version";

/// Summary of device data collected during initialization.
pub const PARAM_DEVICE_DATA: &str = "device_data";

/// How the device is being searched: `"auto_detecting"` or `"manual"`.
pub const PARAM_SEARCHING_TYPE: &str = "searching_type";

/// Value of [`PARAM_SEARCHING_TYPE`] during auto-detection.
pub const SEARCHING_TYPE_AUTO: &str = "auto_detecting";

/// Whether a live operator session (service menu) is active.
pub const PARAM_OPERATOR_PRESENCE: &str = "operator_presence";

/// Enables negotiation of optional serial settings (RTS, DTR).
pub const PARAM_OPTIONAL_PORT_SETTINGS: &str = "optional_port_settings";

/// Name of the serial port the device is attached to.
pub const PARAM_PORT_NAME: &str = "port_name";

/// System name of the endpoint a port is bound to (COM name, PDO name, bus key).
pub const PARAM_SYSTEM_NAME: &str = "system_name";

/// Marker separating a version from its build suffix.
///
/// # Examples
///
/// ```
/// use kiosk_core::constants::VERSION_BUILD_MARKER;
///
/// let version = "3.1.0 build 1207";
/// assert_eq!(version.split(VERSION_BUILD_MARKER).next(), Some("3.1.0"));
/// ```
pub const VERSION_BUILD_MARKER: &str = " build";
