//! Shared types for kiosk peripheral devices.
//!
//! This crate holds what both device drivers and the host application need
//! to agree on without depending on the device core itself: severity levels,
//! initialization and calling-type enums, the named parameter map and the
//! per-slot [`DeviceConfig`].

pub mod config;
pub mod constants;
pub mod error;
pub mod parameters;
pub mod types;

pub use config::DeviceConfig;
pub use error::{Error, Result};
pub use parameters::{DeviceParameters, ParameterValue};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
