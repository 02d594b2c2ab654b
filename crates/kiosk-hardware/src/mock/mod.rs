//! Mock implementations for testing and development.
//!
//! This module provides a simulated port and a simulated driver that can be
//! controlled programmatically without requiring physical hardware.

pub mod driver;
pub mod port;

// Re-export commonly used types
pub use driver::{MockDriver, MockDriverHandle};
pub use port::{MockPort, MockPortHandle};
