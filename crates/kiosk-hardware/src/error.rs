//! Error types for hardware operations.
//!
//! Device faults (paper out, cover open, device unplugged) are never errors:
//! they travel as status codes through the status pipeline. The error type
//! here covers what can fail around that pipeline: transport I/O, endpoint
//! claiming, worker plumbing and configuration.

use std::time::Duration;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors raised by transports, the endpoint registry and device handles.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The port is closed or the device behind it is gone.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The port or transport lacks the requested capability.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// A system port rejected a read, write or setting.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Another device holds the endpoint claim.
    #[error("Port busy: {port}")]
    PortBusy { port: String },

    /// The device thread has exited; the handle is dead.
    #[error("Device worker stopped: {device}")]
    WorkerStopped { device: String },

    #[error(transparent)]
    Core(#[from] kiosk_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Timeout error for `duration`, saturating at `u64::MAX` milliseconds.
    pub fn timeout_after(duration: Duration) -> Self {
        Self::timeout(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn port_busy(port: impl Into<String>) -> Self {
        Self::PortBusy { port: port.into() }
    }

    pub fn worker_stopped(device: impl Into<String>) -> Self {
        Self::WorkerStopped {
            device: device.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::disconnected(HardwareError::disconnected("VKP-80"), "Device disconnected: VKP-80")]
    #[case::timeout(HardwareError::timeout(15000), "Operation timeout after 15000ms")]
    #[case::unsupported(
        HardwareError::unsupported("set_parameters"),
        "Unsupported operation: set_parameters"
    )]
    #[case::busy(HardwareError::port_busy("/dev/ttyS0"), "Port busy: /dev/ttyS0")]
    #[case::stopped(
        HardwareError::worker_stopped("Receipt printer"),
        "Device worker stopped: Receipt printer"
    )]
    fn test_error_display(#[case] error: HardwareError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_timeout_after_saturates() {
        assert!(matches!(
            HardwareError::timeout_after(Duration::from_secs(15)),
            HardwareError::Timeout { duration_ms: 15000 }
        ));
        assert!(matches!(
            HardwareError::timeout_after(Duration::MAX),
            HardwareError::Timeout {
                duration_ms: u64::MAX
            }
        ));
    }

    #[test]
    fn test_core_error_conversion() {
        let core = kiosk_core::Error::Config("history_size must be positive".to_string());
        let error: HardwareError = core.into();
        assert!(matches!(error, HardwareError::Core(_)));
        assert_eq!(
            error.to_string(),
            "Configuration error: history_size must be positive"
        );
    }
}
