//! The seam between the generic device lifecycle and a concrete driver.
//!
//! A driver only knows its protocol: how to identify the device, how to
//! read its status and how to push settings to it. Everything else
//! (status reconciliation, retries, polling, re-initialization) lives in
//! [`DeviceCore`](super::DeviceCore), which calls back into the driver
//! through [`DeviceDriver`] with a [`DriverContext`] borrowing the device
//! state the driver may touch.

use crate::Result;
use crate::error::HardwareError;
use crate::status::{StatusCode, StatusCodes, StatusCollection, StatusPolicy, StatusSpecifications};
use crate::transport::{IoPort, TransportBinding};
use crate::types::{DeviceFlags, DeviceInfo, DeviceType};
use kiosk_core::constants::{PARAM_MODEL_NAME, PARAM_SEARCHING_TYPE, SEARCHING_TYPE_AUTO};
use kiosk_core::{DeviceConfig, DeviceParameters};

/// One-shot action run on the device worker with the driver at hand.
pub type DriverTask = Box<dyn FnOnce(&mut dyn DeviceDriver, &mut DriverContext<'_>) + Send>;

/// Device state lent to a driver hook.
#[derive(Debug)]
pub struct DriverContext<'a> {
    pub transport: &'a mut TransportBinding,
    pub info: &'a mut DeviceInfo,
    pub flags: &'a mut DeviceFlags,
    pub parameters: &'a mut DeviceParameters,
    pub config: &'a DeviceConfig,
    /// Codes reported while updating parameters; processed by the
    /// initialization loop after a failed attempt.
    pub reported: &'a mut StatusCodes,
}

impl DriverContext<'_> {
    /// The transport's port.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Unsupported`] for devices without a port.
    pub fn port(&mut self) -> Result<&mut dyn IoPort> {
        self.transport
            .port()
            .ok_or_else(|| HardwareError::unsupported("device has no port"))
    }

    /// Report a status code from a parameter update.
    pub fn report(&mut self, code: StatusCode) {
        self.reported.insert(code);
    }

    /// Record the identified model.
    pub fn set_model(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.parameters.set(PARAM_MODEL_NAME, name.as_str());
        self.info.name = name;
    }

    #[must_use]
    pub fn is_auto_detecting(&self) -> bool {
        self.parameters.text(PARAM_SEARCHING_TYPE) == Some(SEARCHING_TYPE_AUTO)
    }
}

/// Protocol-specific behavior of a device.
///
/// Hooks run on the device worker and may block on port I/O. Only
/// [`device_type`](Self::device_type) and [`is_connected`](Self::is_connected)
/// are required.
pub trait DeviceDriver: Send {
    fn device_type(&self) -> DeviceType;

    /// Identify the device on the current port settings.
    ///
    /// Sets the model name and identification flags through `ctx`.
    fn is_connected(&mut self, ctx: &mut DriverContext<'_>) -> bool;

    /// Read raw status codes. Returns `false` if the device did not answer.
    fn get_status(&mut self, ctx: &mut DriverContext<'_>, _codes: &mut StatusCodes) -> bool {
        self.is_connected(ctx)
    }

    /// Status read used by polling; drivers wrap `get_status` here to add
    /// protocol-level retries.
    fn process_status(&mut self, ctx: &mut DriverContext<'_>, codes: &mut StatusCodes) -> bool {
        self.get_status(ctx, codes)
    }

    /// Prepare driver state before each parameter update attempt.
    fn set_initial_data(&mut self, _ctx: &mut DriverContext<'_>) {}

    /// Push settings to the device. Failures may be explained by codes
    /// reported through [`DriverContext::report`].
    fn update_parameters(&mut self, _ctx: &mut DriverContext<'_>) -> bool {
        true
    }

    fn finalize_initialization(&mut self, _ctx: &mut DriverContext<'_>) {}

    /// React to a published status change.
    fn post_polling_action(
        &mut self,
        _ctx: &mut DriverContext<'_>,
        _new: &StatusCollection,
        _old: &StatusCollection,
    ) {
    }

    /// Whether something outside the status codes changed and must be
    /// re-announced.
    fn environment_changed(&mut self, _ctx: &mut DriverContext<'_>) -> bool {
        false
    }

    /// Register device-specific status codes and adjust the status policy.
    fn configure(&mut self, _specifications: &mut StatusSpecifications, _policy: &mut StatusPolicy) {
    }

    fn release(&mut self, _ctx: &mut DriverContext<'_>) {}

    /// Add driver entries (firmware, serial number...) to the device data.
    fn device_data(&self, _data: &mut DeviceParameters) {}
}

impl std::fmt::Debug for dyn DeviceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceDriver({})", self.device_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::codes::error;

    struct Silent;

    impl DeviceDriver for Silent {
        fn device_type(&self) -> DeviceType {
            DeviceType::Other
        }

        fn is_connected(&mut self, _ctx: &mut DriverContext<'_>) -> bool {
            false
        }
    }

    struct Parts {
        transport: TransportBinding,
        info: DeviceInfo,
        flags: DeviceFlags,
        parameters: DeviceParameters,
        config: DeviceConfig,
        reported: StatusCodes,
    }

    impl Parts {
        fn new() -> Self {
            Self {
                transport: TransportBinding::None,
                info: DeviceInfo::default(),
                flags: DeviceFlags::default(),
                parameters: DeviceParameters::new(),
                config: DeviceConfig::default(),
                reported: StatusCodes::new(),
            }
        }

        fn context(&mut self) -> DriverContext<'_> {
            DriverContext {
                transport: &mut self.transport,
                info: &mut self.info,
                flags: &mut self.flags,
                parameters: &mut self.parameters,
                config: &self.config,
                reported: &mut self.reported,
            }
        }
    }

    #[test]
    fn test_default_hooks() {
        let mut parts = Parts::new();
        let mut ctx = parts.context();
        let mut driver = Silent;
        let mut codes = StatusCodes::new();

        assert!(!driver.get_status(&mut ctx, &mut codes));
        assert!(!driver.process_status(&mut ctx, &mut codes));
        assert!(driver.update_parameters(&mut ctx));
        assert!(!driver.environment_changed(&mut ctx));
    }

    #[test]
    fn test_context_without_port() {
        let mut parts = Parts::new();
        let mut ctx = parts.context();

        assert!(matches!(ctx.port(), Err(HardwareError::Unsupported { .. })));
    }

    #[test]
    fn test_context_report_and_model() {
        let mut parts = Parts::new();
        {
            let mut ctx = parts.context();
            ctx.report(error::MECHANISM);
            ctx.set_model("VKP-80 II");
            assert!(!ctx.is_auto_detecting());
        }

        assert!(parts.reported.contains(&error::MECHANISM));
        assert_eq!(parts.info.name, "VKP-80 II");
        assert_eq!(parts.parameters.text(PARAM_MODEL_NAME), Some("VKP-80 II"));
    }
}
