//! Device lifecycle and the poll cycle.
//!
//! [`DeviceCore`] holds everything one device knows about itself and runs
//! every lifecycle step synchronously. It is owned by exactly one worker
//! (see [`DeviceHandle`](super::DeviceHandle)), so no step ever observes
//! another one half-done.
//!
//! ```text
//!  initialize ─► check connection ability ─► check existence ─► update parameters (retries)
//!       │                                                              │
//!       └──────────────────────────── finalize: first poll, start polling ◄┘
//!
//!  on_poll ─► do_poll (read, clean, recover, buffer) ─► process_status_codes
//!                                                          │
//!                          publish, post-polling action ◄──┘ (may defer re-identification
//!                                                             and re-initialization)
//! ```

use super::driver::{DeviceDriver, DriverContext, DriverTask};
use super::expect::{PollingExpector, WaitPolicy};
use super::polling::PollingPolicy;
use super::signals::SignalHub;
use crate::Result;
use crate::error::HardwareError;
use crate::status::codes::{error, ok};
use crate::status::{
    CleanContext, StatusCode, StatusCodes, StatusCollection, StatusPolicy, StatusSpecifications,
    StatusTracker,
};
use crate::transport::{
    EndpointRegistry, IoPort, LibUsbBinding, PortParameters, SerialBinding, SerialSettings,
    TransportBinding, UsbBinding, UsbSettings,
};
use crate::types::{DeviceFlags, DeviceInfo, DeviceType};
use chrono::{Local, NaiveDate};
use kiosk_core::constants::{
    PARAM_CALLING_TYPE, PARAM_DEVICE_DATA, PARAM_MODEL_NAME, PARAM_OPERATOR_PRESENCE,
    PARAM_PLUGIN_PATH, PARAM_PP_VERSION, PARAM_SEARCHING_TYPE, SEARCHING_TYPE_AUTO,
};
use kiosk_core::{
    CallingType, DeviceConfig, DeviceParameters, ExtendedStatus, InitState, WarningLevel,
    versions_mismatch,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Work a device schedules for itself, run after the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    CheckExistence,
    Initialize(CallingType),
}

/// Point-in-time view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub device_type: DeviceType,
    pub init_state: InitState,
    pub connected: bool,
    pub collection: StatusCollection,
    pub warning_level: WarningLevel,
    pub polling_active: bool,
    pub history_len: usize,
    pub device_data: DeviceParameters,
}

/// Assembles a [`DeviceCore`] with its transport.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::device::DeviceBuilder;
/// use kiosk_hardware::mock::{MockDriver, MockPort};
/// use kiosk_hardware::transport::{EndpointRegistry, SerialSettings, TransportKind};
/// use kiosk_hardware::types::DeviceType;
/// use kiosk_core::DeviceConfig;
///
/// let registry = EndpointRegistry::shared();
/// let (driver, _driver_handle) = MockDriver::new(DeviceType::Printer);
/// let (port, _port_handle) = MockPort::new(TransportKind::Serial);
///
/// let core = DeviceBuilder::new(DeviceConfig::new("Receipt printer"), driver)
///     .with_serial(SerialSettings::new("COM3"), port, registry)
///     .build()
///     .unwrap();
///
/// assert_eq!(core.name(), "Receipt printer");
/// ```
pub struct DeviceBuilder {
    id: Uuid,
    config: DeviceConfig,
    driver: Box<dyn DeviceDriver>,
    transport: TransportBinding,
}

impl DeviceBuilder {
    pub fn new(config: DeviceConfig, driver: impl DeviceDriver + 'static) -> Self {
        Self::from_boxed(config, Box::new(driver))
    }

    pub fn from_boxed(config: DeviceConfig, driver: Box<dyn DeviceDriver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            driver,
            transport: TransportBinding::None,
        }
    }

    /// Identity used to claim endpoints.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn with_serial(
        mut self,
        settings: SerialSettings,
        port: impl IoPort + 'static,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        self.transport =
            TransportBinding::Serial(SerialBinding::new(settings, Box::new(port), registry, self.id));
        self
    }

    #[must_use]
    pub fn with_usb(
        mut self,
        settings: UsbSettings,
        port: impl IoPort + 'static,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        self.transport =
            TransportBinding::Usb(UsbBinding::new(settings, Box::new(port), registry, self.id));
        self
    }

    #[must_use]
    pub fn with_libusb(
        mut self,
        settings: UsbSettings,
        port: impl IoPort + 'static,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        self.transport =
            TransportBinding::LibUsb(LibUsbBinding::new(settings, Box::new(port), registry, self.id));
        self
    }

    /// # Errors
    ///
    /// Returns a configuration error if the device configuration is invalid.
    pub fn build(self) -> Result<DeviceCore> {
        self.config.validate()?;
        Ok(DeviceCore::new(self.id, self.config, self.driver, self.transport))
    }
}

/// State and lifecycle of one device.
#[derive(Debug)]
pub struct DeviceCore {
    id: Uuid,
    config: DeviceConfig,
    driver: Box<dyn DeviceDriver>,
    transport: TransportBinding,
    info: DeviceInfo,
    flags: DeviceFlags,
    parameters: DeviceParameters,
    reported: StatusCodes,
    tracker: StatusTracker,
    polling: Option<PollingPolicy>,
    signals: Arc<SignalHub>,
    connected: bool,
    init_state: InitState,
    post_polling_enabled: bool,
    device_data: DeviceParameters,
    last_poll_date: Option<NaiveDate>,
    deferred: VecDeque<DeferredTask>,
}

impl DeviceCore {
    /// Build a core, letting the driver and transport shape the status policy.
    pub fn new(
        id: Uuid,
        config: DeviceConfig,
        mut driver: Box<dyn DeviceDriver>,
        transport: TransportBinding,
    ) -> Self {
        let mut specifications = StatusSpecifications::default();
        let mut policy = StatusPolicy {
            excess: config
                .excess_status_codes
                .iter()
                .copied()
                .map(StatusCode::from)
                .collect(),
            max_bad_answers: config.max_bad_answers,
            force_status_buffer: config.force_status_buffer,
            ..StatusPolicy::default()
        };
        policy.replaceable.extend(transport.replaceable_codes());
        driver.configure(&mut specifications, &mut policy);

        let polling = config
            .polling_interval()
            .filter(|interval| !interval.is_zero())
            .map(PollingPolicy::new);

        Self {
            id,
            info: DeviceInfo::new(config.name.clone()),
            flags: DeviceFlags::default(),
            parameters: config.parameters.clone(),
            reported: StatusCodes::new(),
            tracker: StatusTracker::new(specifications, policy, config.history_size),
            polling,
            signals: Arc::new(SignalHub::new()),
            connected: false,
            init_state: InitState::NotStarted,
            post_polling_enabled: true,
            device_data: DeviceParameters::new(),
            last_poll_date: None,
            deferred: VecDeque::new(),
            config,
            driver,
            transport,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Model name once identified, the configured name before that.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.driver.device_type()
    }

    #[must_use]
    pub fn init_state(&self) -> InitState {
        self.init_state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    #[must_use]
    pub fn flags(&self) -> &DeviceFlags {
        &self.flags
    }

    #[must_use]
    pub fn parameters(&self) -> &DeviceParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut DeviceParameters {
        &mut self.parameters
    }

    #[must_use]
    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    #[must_use]
    pub fn status_collection(&self) -> &StatusCollection {
        self.tracker.collection()
    }

    #[must_use]
    pub fn transport(&self) -> &TransportBinding {
        &self.transport
    }

    #[must_use]
    pub fn polling(&self) -> Option<&PollingPolicy> {
        self.polling.as_ref()
    }

    #[must_use]
    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    /// Device data collected during the last initialization.
    #[must_use]
    pub fn device_data(&self) -> &DeviceParameters {
        &self.device_data
    }

    #[must_use]
    pub fn deferred_tasks(&self) -> Vec<DeferredTask> {
        self.deferred.iter().copied().collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        let collection = self.tracker.collection().clone();
        DeviceSnapshot {
            name: self.info.name.clone(),
            device_type: self.device_type(),
            init_state: self.init_state,
            connected: self.connected,
            warning_level: collection.warning_level(),
            collection,
            polling_active: self.polling.as_ref().is_some_and(PollingPolicy::is_active),
            history_len: self.tracker.history().len(),
            device_data: self.device_data.clone(),
        }
    }

    fn split(&mut self) -> (&mut dyn DeviceDriver, DriverContext<'_>) {
        let ctx = DriverContext {
            transport: &mut self.transport,
            info: &mut self.info,
            flags: &mut self.flags,
            parameters: &mut self.parameters,
            config: &self.config,
            reported: &mut self.reported,
        };
        (self.driver.as_mut(), ctx)
    }

    /// Run `f` against the driver with its context.
    pub fn with_driver<R>(
        &mut self,
        f: impl FnOnce(&mut dyn DeviceDriver, &mut DriverContext<'_>) -> R,
    ) -> R {
        let (driver, mut ctx) = self.split();
        f(driver, &mut ctx)
    }

    fn without_post_polling<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let enabled = std::mem::replace(&mut self.post_polling_enabled, false);
        let result = f(self);
        self.post_polling_enabled = enabled;
        result
    }

    fn operator_presence(&self) -> bool {
        self.parameters
            .flag(PARAM_OPERATOR_PRESENCE)
            .unwrap_or(self.config.operator_presence)
    }

    fn is_auto_detecting(&self) -> bool {
        self.parameters.text(PARAM_SEARCHING_TYPE) == Some(SEARCHING_TYPE_AUTO)
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Bring the device into service.
    ///
    /// Never fails: every problem ends in [`InitState::Fail`] and a status
    /// code. [`Signal::Initialized`](super::Signal::Initialized) is emitted
    /// on success.
    pub fn initialize(&mut self, calling_type: CallingType) {
        info!("{:=^72}", format!(" Initialize {} ", self.info.name));

        self.parameters.set(PARAM_CALLING_TYPE, calling_type.as_str());
        self.init_state = InitState::InProgress;
        self.flags.initialization_error = false;
        self.transport.prepare(&self.parameters);

        if !self.transport.check_connection_ability() {
            warn!("Cannot open the port of {}", self.info.name);
            self.connected = false;
            self.init_state = InitState::Fail;
        } else {
            if self.is_power_reboot() || !self.connected {
                self.check_existence();
            }

            self.init_state = if self.connected && self.update_parameters_with_retries() {
                InitState::Success
            } else {
                InitState::Fail
            };
        }

        self.finalize_initialization();
        self.refresh_device_data();
        self.parameters.remove(PARAM_CALLING_TYPE);

        info!("Initialization of {} finished: {}", self.info.name, self.init_state);
        if self.init_state == InitState::Success {
            self.signals.emit_initialized();
        }
    }

    /// Initialize again on the device's own behalf.
    pub fn re_initialize(&mut self) {
        self.initialize(CallingType::Internal);
    }

    fn update_parameters_with_retries(&mut self) -> bool {
        self.emit_status_code(ok::INITIALIZATION, ExtendedStatus::Interface);
        self.tracker.clear_collection();

        let repeat = self.config.initialize_repeat_count.max(1);
        let mut count = 0;
        let mut critical = false;

        loop {
            self.reported.clear();
            let updated = self.with_driver(|driver, ctx| {
                driver.set_initial_data(ctx);
                driver.update_parameters(ctx)
            });
            if updated {
                break;
            }

            let reported = std::mem::take(&mut self.reported);
            if !reported.is_empty() {
                self.without_post_polling(|core| core.process_status_codes(&reported));
            }

            let errors = self.tracker.collection().bucket(WarningLevel::Error);
            critical = errors.len() > 1
                || (errors.len() == 1 && !errors.contains(&error::INITIALIZATION));
            count += 1;
            warn!(
                "Parameters of {} not updated, attempt {count} of {repeat}{}",
                self.info.name,
                if critical { ", critical errors" } else { "" }
            );

            if count >= repeat || critical {
                break;
            }
        }

        !critical && count < repeat
    }

    fn finalize_initialization(&mut self) {
        self.with_driver(|driver, ctx| driver.finalize_initialization(ctx));

        if self.connected {
            self.on_poll();
        } else {
            self.process_status_codes(&[error::NOT_AVAILABLE].into());
        }

        if self.config.start_polling_on_initialize
            && let Some(polling) = self.polling.as_mut()
        {
            polling.start_polling(false);
        }
    }

    fn refresh_device_data(&mut self) {
        let mut data = self.transport.device_data();
        if let Some(path) = self.parameters.text(PARAM_PLUGIN_PATH) {
            data.set(PARAM_PLUGIN_PATH, path);
        }
        data.set(PARAM_MODEL_NAME, self.info.name.as_str());
        if let Some(serial_number) = &self.info.serial_number {
            data.set("serial_number", serial_number.as_str());
        }
        if let Some(firmware) = &self.info.firmware_version {
            data.set("firmware_version", firmware.as_str());
        }
        self.driver.device_data(&mut data);

        info!("Device data: {data}");
        self.parameters.set(PARAM_DEVICE_DATA, data.to_string());
        self.device_data = data;
    }

    /// Stop polling, free the transport and forget the published state.
    ///
    /// Idempotent. The history is kept across releases.
    pub fn release(&mut self) {
        if let Some(polling) = self.polling.as_mut() {
            polling.stop_polling();
        }
        self.transport.release();
        self.with_driver(|driver, ctx| driver.release(ctx));

        self.connected = false;
        self.tracker.reset();
        self.deferred.clear();
        if self.init_state != InitState::NotStarted {
            info!("{} released", self.info.name);
        }
        self.init_state = InitState::NotStarted;
    }

    // ------------------------------------------------------------------
    // Identification
    // ------------------------------------------------------------------

    /// Identify the device, trying each line setting candidate in turn.
    pub fn check_existence(&mut self) -> bool {
        let auto_detecting = self.is_auto_detecting();
        if auto_detecting && !self.config.auto_detectable {
            info!("{} is not auto-detectable", self.info.name);
            return false;
        }

        self.flags.reset_identification();
        let candidates = self.transport.parameter_candidates();
        let identified = self.without_post_polling(|core| core.identify(&candidates));

        if auto_detecting && !self.flags.model_compatibility {
            info!("Model {} is not compatible", self.info.name);
            self.connected = false;
            return false;
        }
        if !identified {
            warn!("{} is not identified", self.info.name);
            self.connected = false;
            return false;
        }

        if let Some(product) = self.transport.detected_product().cloned() {
            self.flags.verified &= product.verified;
            if self.info.name == self.config.name {
                self.info.name = product.model;
            }
        }
        self.parameters.set(PARAM_MODEL_NAME, self.info.name.as_str());
        info!(
            "Device {} identified{}",
            self.info.name,
            if self.flags.verified { "" } else { " (model not verified)" }
        );

        self.connected = true;
        true
    }

    fn identify(&mut self, candidates: &[PortParameters]) -> bool {
        if candidates.is_empty() {
            return self.with_driver(|driver, ctx| driver.is_connected(ctx));
        }

        for parameters in candidates {
            if let Err(e) = self.transport.apply_parameters(parameters) {
                debug!("Cannot apply {parameters}: {e}");
                continue;
            }
            if self.with_driver(|driver, ctx| driver.is_connected(ctx)) {
                return true;
            }
        }
        false
    }

    /// Identify the device, releasing it if nothing answers.
    pub fn find(&mut self) -> bool {
        if self.check_existence() {
            return true;
        }
        self.release();
        false
    }

    /// Start walking free endpoints. Returns the candidate count.
    pub fn begin_detecting(&mut self) -> usize {
        self.transport.begin_detecting()
    }

    /// Claim and open the next free endpoint.
    pub fn move_next(&mut self) -> bool {
        self.transport.move_next()
    }

    /// Search every free endpoint for the device and keep the first match.
    pub fn auto_detect(&mut self) -> bool {
        self.parameters.set(PARAM_SEARCHING_TYPE, SEARCHING_TYPE_AUTO);

        let found = if self.transport.port().is_none() {
            self.check_existence()
        } else {
            let count = self.begin_detecting();
            info!("Searching {} over {count} free endpoints", self.info.name);

            let mut found = false;
            while self.move_next() {
                if self.check_existence() {
                    self.transport.claim_current();
                    found = true;
                    break;
                }
            }
            found
        };

        self.parameters.remove(PARAM_SEARCHING_TYPE);
        if found {
            info!("{} found", self.info.name);
        } else {
            info!("{} not found", self.info.name);
        }
        found
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// The device was just powered up again, or has no history yet.
    #[must_use]
    pub fn is_power_reboot(&self) -> bool {
        self.tracker.is_power_reboot()
    }

    #[must_use]
    pub fn is_initialization_error(&self, codes: &StatusCodes) -> bool {
        self.tracker
            .is_initialization_error(codes, self.init_state == InitState::Fail)
    }

    /// The plugin was built for another host version.
    #[must_use]
    pub fn is_plugin_mismatch(&self) -> bool {
        self.parameters
            .text(PARAM_PP_VERSION)
            .is_some_and(|version| versions_mismatch(version, kiosk_core::VERSION))
    }

    /// Read, clean, recover and buffer one set of status codes.
    pub fn do_poll(&mut self) -> StatusCodes {
        self.log_date_rollover();

        let mut codes = StatusCodes::new();
        let answered = self.with_driver(|driver, ctx| driver.process_status(ctx, &mut codes));
        if !answered {
            codes.insert(error::NOT_AVAILABLE);
        } else if codes.is_empty() {
            codes.insert(ok::OK);
        }

        let operator_presence = self.operator_presence();
        let context = CleanContext {
            initialization_failed: self.init_state == InitState::Fail,
            operator_presence,
            plugin_mismatch: self.is_plugin_mismatch(),
        };
        self.tracker
            .clean_status_codes(&mut codes, &mut self.flags, &context);
        self.tracker
            .recover_errors(&mut codes, context.initialization_failed);
        self.tracker
            .apply_status_buffer(&mut codes, operator_presence, self.post_polling_enabled);

        codes
    }

    /// One full poll: read, publish, then run post-poll tasks.
    pub fn on_poll(&mut self) {
        let codes = self.do_poll();
        self.process_status_codes(&codes);
        self.run_post_poll_tasks();
    }

    /// A poll without post-polling side effects.
    pub fn simple_poll(&mut self) {
        self.without_post_polling(Self::on_poll);
    }

    /// Publish a code set and react to the transition.
    pub fn process_status_codes(&mut self, codes: &StatusCodes) {
        let environment_changed = self.environment_changed();
        let publication = self.tracker.publish(codes, environment_changed);

        if let Some(signal) = publication.signal {
            self.signals.emit_status(signal);
        }

        if self.post_polling_enabled {
            self.transport.on_status(codes);
            self.with_driver(|driver, ctx| {
                driver.post_polling_action(ctx, &publication.new, &publication.old);
            });
            self.post_polling_action(&publication.new, &publication.old);
        }

        self.connected = !codes.contains(&error::NOT_AVAILABLE);
        if self.post_polling_enabled && self.init_state.is_finished() {
            self.init_state = if self.connected && self.init_state == InitState::Success {
                InitState::Success
            } else {
                InitState::Fail
            };
        }
    }

    fn environment_changed(&mut self) -> bool {
        let transport = self.transport.environment_changed();
        let driver = self.with_driver(|driver, ctx| driver.environment_changed(ctx));
        transport || driver
    }

    /// Emit a single code, e.g. "initialization in progress".
    pub fn emit_status_code(&mut self, code: StatusCode, extended: ExtendedStatus) {
        let signal = self.tracker.signal_for_code(code, extended);
        self.signals.emit_status(signal);
    }

    /// Schedule re-identification and re-initialization after the device
    /// came back or its errors cleared.
    pub fn post_polling_action(&mut self, new: &StatusCollection, old: &StatusCollection) {
        let power_turn_on =
            old.contains_code(error::NOT_AVAILABLE) && !new.contains_code(error::NOT_AVAILABLE);
        let new_errors = new.contains_level(WarningLevel::Error);
        let old_errors = old.contains_level(WarningLevel::Error);

        if !((power_turn_on && new_errors) || (old_errors && !new_errors)) {
            return;
        }

        if self.operator_presence() {
            debug!("Operator is present, re-identification of {} deferred", self.info.name);
            self.deferred.push_back(DeferredTask::CheckExistence);
        } else {
            info!("Re-identifying {} after a status transition", self.info.name);
            self.check_existence();
        }

        if !new_errors {
            info!("Errors of {} cleared, re-initialization scheduled", self.info.name);
            self.deferred
                .push_back(DeferredTask::Initialize(CallingType::Internal));
        }
    }

    /// Run the deferred tasks queued so far. Tasks queued while running
    /// wait for the next call.
    pub fn run_deferred(&mut self) {
        let tasks = std::mem::take(&mut self.deferred);
        for task in tasks {
            debug!("Running deferred {task:?}");
            match task {
                DeferredTask::CheckExistence => {
                    self.check_existence();
                }
                DeferredTask::Initialize(calling_type) => self.initialize(calling_type),
            }
        }
    }

    /// Poll `get_status` until the device's readiness equals `ready`.
    pub fn wait_ready(&mut self, policy: WaitPolicy, ready: bool) -> bool {
        struct Probe<'a> {
            core: &'a mut DeviceCore,
            answered: Option<bool>,
        }

        let mut probe = Probe {
            core: self,
            answered: None,
        };
        PollingExpector::new(policy).wait(
            &mut probe,
            |probe| {
                let answered = probe.core.query_ready();
                probe.answered = Some(answered);
                true
            },
            |probe| probe.answered == Some(ready),
            |_| false,
        )
    }

    fn query_ready(&mut self) -> bool {
        let mut codes = StatusCodes::new();
        self.with_driver(|driver, ctx| driver.get_status(ctx, &mut codes))
            && !codes.contains(&error::NOT_AVAILABLE)
    }

    fn log_date_rollover(&mut self) {
        let today = Local::now().date_naive();
        if let Some(previous) = self.last_poll_date.replace(today)
            && previous != today
        {
            info!("New day, device data of {}: {}", self.info.name, self.device_data);
        }
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a configuration error if no polling interval is configured.
    pub fn start_polling(&mut self, not_wait_first: bool) -> Result<()> {
        self.polling_mut()?.start_polling(not_wait_first);
        Ok(())
    }

    pub fn stop_polling(&mut self) {
        if let Some(polling) = self.polling.as_mut() {
            polling.stop_polling();
        }
    }

    /// Change the polling interval, enabling polling support if needed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero interval.
    pub fn set_polling_interval(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(HardwareError::configuration("polling interval must be positive"));
        }
        match self.polling.as_mut() {
            Some(polling) => {
                polling.set_polling_interval(interval);
            }
            None => self.polling = Some(PollingPolicy::new(interval)),
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a configuration error if no polling interval is configured.
    pub fn enqueue_post_poll_task(&mut self, task: DriverTask) -> Result<()> {
        self.polling_mut()?.enqueue_post_poll_task(task);
        Ok(())
    }

    fn polling_mut(&mut self) -> Result<&mut PollingPolicy> {
        self.polling
            .as_mut()
            .ok_or_else(|| HardwareError::configuration("polling interval is not configured"))
    }

    fn run_post_poll_tasks(&mut self) {
        if !self.connected {
            return;
        }
        let Some(polling) = self.polling.as_mut() else {
            return;
        };

        let tasks = polling.take_post_poll_tasks();
        if !tasks.is_empty() {
            debug!("Running {} post-poll tasks", tasks.len());
        }
        for task in tasks {
            self.with_driver(|driver, ctx| task(driver, ctx));
        }
    }

    /// Wait for the next polling tick; pending forever without polling.
    pub async fn polling_tick(&mut self) {
        match self.polling.as_mut() {
            Some(polling) => polling.tick().await,
            None => std::future::pending::<()>().await,
        }
    }
}
