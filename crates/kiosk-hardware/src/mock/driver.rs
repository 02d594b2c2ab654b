//! Mock device driver for testing and development.
//!
//! Like [`MockPort`](super::MockPort), the driver comes with a handle that
//! scripts its behavior from the test side: whether the device answers,
//! which model it reports, the status codes of upcoming polls and the
//! outcome of parameter updates.

use crate::device::{DeviceDriver, DriverContext};
use crate::status::{StatusCode, StatusCodes};
use crate::types::DeviceType;
use kiosk_core::DeviceParameters;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct MockDriverState {
    connected: bool,
    model: Option<String>,
    compatible: bool,
    verified: bool,
    old_firmware: bool,
    firmware_version: Option<String>,
    statuses: VecDeque<StatusCodes>,
    status: StatusCodes,
    update_results: VecDeque<bool>,
    update_reports: StatusCodes,
    environment_changed: bool,
    identify_calls: usize,
    status_calls: usize,
    update_calls: usize,
    finalize_calls: usize,
    release_calls: usize,
}

impl Default for MockDriverState {
    fn default() -> Self {
        Self {
            connected: true,
            model: None,
            compatible: true,
            verified: true,
            old_firmware: false,
            firmware_version: None,
            statuses: VecDeque::new(),
            status: StatusCodes::new(),
            update_results: VecDeque::new(),
            update_reports: StatusCodes::new(),
            environment_changed: false,
            identify_calls: 0,
            status_calls: 0,
            update_calls: 0,
            finalize_calls: 0,
            release_calls: 0,
        }
    }
}

fn lock(state: &Mutex<MockDriverState>) -> MutexGuard<'_, MockDriverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted driver of any device type.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::device::DeviceBuilder;
/// use kiosk_hardware::mock::MockDriver;
/// use kiosk_hardware::types::DeviceType;
/// use kiosk_core::{CallingType, DeviceConfig, InitState};
///
/// let (driver, handle) = MockDriver::new(DeviceType::Printer);
/// handle.set_model("Mock printer");
///
/// let mut core = DeviceBuilder::new(DeviceConfig::new("Printer"), driver).build().unwrap();
/// core.initialize(CallingType::External);
///
/// assert_eq!(core.init_state(), InitState::Success);
/// assert_eq!(core.name(), "Mock printer");
/// ```
#[derive(Debug)]
pub struct MockDriver {
    device_type: DeviceType,
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriver {
    /// Create a mock driver and the handle controlling it.
    pub fn new(device_type: DeviceType) -> (Self, MockDriverHandle) {
        let state = Arc::new(Mutex::new(MockDriverState::default()));
        let driver = Self {
            device_type,
            state: state.clone(),
        };
        (driver, MockDriverHandle { state })
    }

    fn state(&self) -> MutexGuard<'_, MockDriverState> {
        lock(&self.state)
    }
}

impl DeviceDriver for MockDriver {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn is_connected(&mut self, ctx: &mut DriverContext<'_>) -> bool {
        let mut state = self.state();
        state.identify_calls += 1;
        if !state.connected {
            return false;
        }

        if let Some(model) = state.model.clone() {
            ctx.set_model(model);
        }
        ctx.flags.model_compatibility = state.compatible;
        ctx.flags.verified = state.verified;
        ctx.flags.old_firmware = state.old_firmware;
        ctx.info.firmware_version = state.firmware_version.clone();
        true
    }

    fn get_status(&mut self, _ctx: &mut DriverContext<'_>, codes: &mut StatusCodes) -> bool {
        let mut state = self.state();
        state.status_calls += 1;
        if !state.connected {
            return false;
        }

        let next = state
            .statuses
            .pop_front()
            .unwrap_or_else(|| state.status.clone());
        codes.extend(next);
        true
    }

    fn update_parameters(&mut self, ctx: &mut DriverContext<'_>) -> bool {
        let mut state = self.state();
        state.update_calls += 1;

        let updated = state.update_results.pop_front().unwrap_or(true);
        if !updated {
            for code in &state.update_reports {
                ctx.report(*code);
            }
        }
        updated
    }

    fn finalize_initialization(&mut self, _ctx: &mut DriverContext<'_>) {
        self.state().finalize_calls += 1;
    }

    fn environment_changed(&mut self, _ctx: &mut DriverContext<'_>) -> bool {
        std::mem::take(&mut self.state().environment_changed)
    }

    fn release(&mut self, _ctx: &mut DriverContext<'_>) {
        self.state().release_calls += 1;
    }

    fn device_data(&self, data: &mut DeviceParameters) {
        if let Some(version) = &self.state().firmware_version {
            data.extend_entry("firmware", "version", version);
        }
    }
}

/// Controls a [`MockDriver`] from tests.
#[derive(Debug, Clone)]
pub struct MockDriverHandle {
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriverHandle {
    fn state(&self) -> MutexGuard<'_, MockDriverState> {
        lock(&self.state)
    }

    /// Make the device answer or stay silent.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.state().model = Some(model.into());
    }

    pub fn set_compatible(&self, compatible: bool) {
        self.state().compatible = compatible;
    }

    pub fn set_verified(&self, verified: bool) {
        self.state().verified = verified;
    }

    pub fn set_old_firmware(&self, old_firmware: bool) {
        self.state().old_firmware = old_firmware;
    }

    pub fn set_firmware_version(&self, version: impl Into<String>) {
        self.state().firmware_version = Some(version.into());
    }

    /// Codes reported by every poll once the queued ones run out.
    pub fn set_status(&self, codes: impl IntoIterator<Item = StatusCode>) {
        self.state().status = codes.into_iter().collect();
    }

    /// Codes reported by one upcoming poll.
    pub fn push_status(&self, codes: impl IntoIterator<Item = StatusCode>) {
        self.state().statuses.push_back(codes.into_iter().collect());
    }

    /// Outcome of one upcoming parameter update; updates succeed otherwise.
    pub fn push_update_result(&self, updated: bool) {
        self.state().update_results.push_back(updated);
    }

    /// Codes reported by each failing parameter update.
    pub fn set_update_reports(&self, codes: impl IntoIterator<Item = StatusCode>) {
        self.state().update_reports = codes.into_iter().collect();
    }

    /// Report an environment change on the next publication.
    pub fn trigger_environment_change(&self) {
        self.state().environment_changed = true;
    }

    #[must_use]
    pub fn identify_calls(&self) -> usize {
        self.state().identify_calls
    }

    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }

    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.state().update_calls
    }

    #[must_use]
    pub fn finalize_calls(&self) -> usize {
        self.state().finalize_calls
    }

    #[must_use]
    pub fn release_calls(&self) -> usize {
        self.state().release_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::codes::{error, warning};
    use crate::transport::TransportBinding;
    use crate::types::{DeviceFlags, DeviceInfo};
    use kiosk_core::DeviceConfig;

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
    fn test_identification_sets_model_and_flags() {
        let (mut driver, handle) = MockDriver::new(DeviceType::CardReader);
        handle.set_model("Mock reader");
        handle.set_verified(false);
        handle.set_old_firmware(true);

        let mut parts = Parts::new();
        assert!(driver.is_connected(&mut parts.context()));

        assert_eq!(parts.info.name, "Mock reader");
        assert!(!parts.flags.verified);
        assert!(parts.flags.old_firmware);
        assert_eq!(handle.identify_calls(), 1);
    }

    #[test]
    fn test_queued_statuses_then_default() {
        let (mut driver, handle) = MockDriver::new(DeviceType::Printer);
        handle.set_status([warning::FIRMWARE]);
        handle.push_status([error::COVER_IS_OPENED]);

        let mut parts = Parts::new();
        let mut first = StatusCodes::new();
        assert!(driver.get_status(&mut parts.context(), &mut first));
        assert_eq!(first, [error::COVER_IS_OPENED].into());

        let mut second = StatusCodes::new();
        assert!(driver.get_status(&mut parts.context(), &mut second));
        assert_eq!(second, [warning::FIRMWARE].into());
    }

    #[test]
    fn test_silent_device() {
        let (mut driver, handle) = MockDriver::new(DeviceType::Printer);
        handle.set_connected(false);

        let mut parts = Parts::new();
        let mut codes = StatusCodes::new();
        assert!(!driver.is_connected(&mut parts.context()));
        assert!(!driver.get_status(&mut parts.context(), &mut codes));
        assert!(codes.is_empty());
    }

    #[test]
    fn test_failed_update_reports_codes() {
        let (mut driver, handle) = MockDriver::new(DeviceType::Dispenser);
        handle.push_update_result(false);
        handle.set_update_reports([error::MECHANISM]);

        let mut parts = Parts::new();
        assert!(!driver.update_parameters(&mut parts.context()));
        assert!(parts.reported.contains(&error::MECHANISM));

        parts.reported.clear();
        assert!(driver.update_parameters(&mut parts.context()));
        assert!(parts.reported.is_empty());
        assert_eq!(handle.update_calls(), 2);
    }

    #[test]
    fn test_environment_change_is_reported_once() {
        let (mut driver, handle) = MockDriver::new(DeviceType::Modem);
        handle.trigger_environment_change();

        let mut parts = Parts::new();
        assert!(driver.environment_changed(&mut parts.context()));
        assert!(!driver.environment_changed(&mut parts.context()));
    }
}
