//! Cloneable, thread-safe access to a device.

use super::core::{DeviceCore, DeviceSnapshot};
use super::driver::{DeviceDriver, DriverContext, DriverTask};
use super::expect::WaitPolicy;
use super::signals::{DeviceEvent, Signal, SignalHub};
use super::worker::{Command, Worker};
use crate::Result;
use crate::error::HardwareError;
use crate::status::StatusCollection;
use crate::types::DeviceType;
use kiosk_core::constants::COMMAND_QUEUE_SIZE;
use kiosk_core::{CallingType, ParameterValue};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
struct Inner {
    id: Uuid,
    name: String,
    device_type: DeviceType,
    signals: Arc<SignalHub>,
    release_timeout: Duration,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<DeviceSnapshot>,
    pending: Mutex<Option<Worker>>,
}

/// Handle to a device running on its own thread.
///
/// Every call becomes a command for the device thread, so calls from any
/// number of tasks are serialized there. The thread starts with the first
/// command.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::device::{DeviceBuilder, DeviceHandle};
/// use kiosk_hardware::mock::MockDriver;
/// use kiosk_hardware::types::DeviceType;
/// use kiosk_core::{DeviceConfig, InitState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kiosk_hardware::Result<()> {
/// let (driver, _control) = MockDriver::new(DeviceType::Printer);
/// let core = DeviceBuilder::new(DeviceConfig::new("Printer"), driver).build()?;
/// let device = DeviceHandle::new(core);
///
/// device.initialize().await?;
/// let snapshot = device.snapshot().await?;
/// assert_eq!(snapshot.init_state, InitState::Success);
///
/// device.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    inner: Arc<Inner>,
}

impl DeviceHandle {
    pub fn new(core: DeviceCore) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (status_tx, status) = watch::channel(core.snapshot());

        let inner = Inner {
            id: core.id(),
            name: core.name().to_string(),
            device_type: core.device_type(),
            signals: core.signals().clone(),
            release_timeout: core.config().release_timeout(),
            commands,
            status,
            pending: Mutex::new(None),
        };
        let worker = Worker::new(core, receiver, status_tx);
        *inner.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Name the device was created with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.inner.device_type
    }

    /// Whether the device thread has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.pending().is_none()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stopped(&self) -> HardwareError {
        HardwareError::worker_stopped(self.inner.name.as_str())
    }

    fn ensure_started(&self) -> Result<()> {
        let Some(worker) = self.pending().take() else {
            return Ok(());
        };
        debug!("Starting the thread of {}", self.inner.name);
        worker.spawn()?;
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.ensure_started()?;
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| self.stopped())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| self.stopped())
    }

    async fn request_bounded(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> Command,
        wait: bool,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        if !wait {
            return Ok(());
        }

        let timeout = self.inner.release_timeout;
        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(self.stopped()),
            Err(_) => {
                warn!("{} did not confirm within {timeout:?}", self.inner.name);
                Err(HardwareError::timeout_after(timeout))
            }
        }
    }

    /// Queue an initialization; completion is announced by
    /// [`Signal::Initialized`].
    pub async fn initialize(&self) -> Result<()> {
        self.send(Command::Initialize(CallingType::External)).await
    }

    /// Release the device. With `wait`, block until the device thread
    /// confirms, bounded by the configured release timeout.
    pub async fn release(&self, wait: bool) -> Result<()> {
        self.request_bounded(|reply| Command::Release { reply }, wait)
            .await
    }

    pub async fn check_existence(&self) -> Result<bool> {
        self.request(|reply| Command::CheckExistence { reply }).await
    }

    /// Identify the device, releasing it when nothing answers.
    pub async fn find(&self) -> Result<bool> {
        self.request(|reply| Command::Find { reply }).await
    }

    /// Poll now and return the published collection.
    pub async fn poll(&self) -> Result<StatusCollection> {
        self.request(|reply| Command::Poll { reply }).await
    }

    /// Poll without post-polling actions.
    pub async fn simple_poll(&self) -> Result<StatusCollection> {
        self.request(|reply| Command::SimplePoll { reply }).await
    }

    pub async fn start_polling(&self, not_wait_first: bool) -> Result<()> {
        self.request(|reply| Command::StartPolling {
            not_wait_first,
            reply,
        })
        .await?
    }

    /// Stop the polling timer. With `wait`, block until any poll in
    /// progress has finished, bounded by the configured release timeout.
    pub async fn stop_polling(&self, wait: bool) -> Result<()> {
        self.request_bounded(|reply| Command::StopPolling { reply }, wait)
            .await
    }

    /// # Errors
    ///
    /// Returns a configuration error for a zero interval.
    pub async fn set_polling_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(HardwareError::configuration("polling interval must be positive"));
        }
        self.request(|reply| Command::SetPollingInterval { interval, reply })
            .await?
    }

    /// Run `task` after the next poll that finds the device connected.
    pub async fn enqueue_post_poll_task(&self, task: DriverTask) -> Result<()> {
        self.request(|reply| Command::EnqueuePostPollTask { task, reply })
            .await?
    }

    /// Run `operation` against the driver on the device thread.
    pub async fn execute<R, F>(&self, operation: F) -> Result<R>
    where
        F: FnOnce(&mut dyn DeviceDriver, &mut DriverContext<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.request(|reply| {
            Command::Execute(Box::new(move |core: &mut DeviceCore| {
                let _ = reply.send(core.with_driver(operation));
            }))
        })
        .await
    }

    /// Set a device parameter, e.g. the operator presence flag.
    pub async fn set_parameter(
        &self,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) -> Result<()> {
        let name = name.into();
        let value = value.into();
        self.request(|reply| {
            Command::Execute(Box::new(move |core: &mut DeviceCore| {
                core.parameters_mut().set(name, value);
                let _ = reply.send(());
            }))
        })
        .await
    }

    /// Search free endpoints for the device.
    pub async fn auto_detect(&self) -> Result<bool> {
        self.request(|reply| Command::AutoDetect { reply }).await
    }

    /// Wait until the device's readiness equals `ready`.
    pub async fn wait_ready(&self, policy: WaitPolicy, ready: bool) -> Result<bool> {
        self.request(|reply| Command::WaitReady {
            policy,
            ready,
            reply,
        })
        .await
    }

    /// State of the device once every earlier command has run.
    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Latest published state, without a round trip.
    #[must_use]
    pub fn status(&self) -> DeviceSnapshot {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified after every command and poll.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<DeviceSnapshot> {
        self.inner.status.clone()
    }

    #[must_use]
    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.inner.signals
    }

    /// Connect `receiver` to `signal`; `None` if already connected.
    pub fn subscribe(
        &self,
        signal: Signal,
        receiver: impl Into<String>,
    ) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        self.inner.signals.subscribe(signal, receiver)
    }

    pub fn unsubscribe(&self, signal: Signal, receiver: &str) -> bool {
        self.inner.signals.unsubscribe(signal, receiver)
    }

    /// Release the device and stop its thread.
    ///
    /// A device whose thread never started is released in place.
    pub async fn shutdown(&self) -> Result<()> {
        let pending = self.pending().take();
        if let Some(worker) = pending {
            worker.release_unstarted();
            return Ok(());
        }

        match self
            .request_bounded(|reply| Command::Shutdown { reply }, true)
            .await
        {
            Err(HardwareError::WorkerStopped { .. }) => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceBuilder;
    use crate::mock::{MockDriver, MockDriverHandle};
    use crate::status::codes::{error, ok};
    use kiosk_core::constants::PARAM_OPERATOR_PRESENCE;
    use kiosk_core::{DeviceConfig, InitState};

    fn device(config: DeviceConfig) -> (DeviceHandle, MockDriverHandle) {
        let (driver, control) = MockDriver::new(DeviceType::Printer);
        let core = DeviceBuilder::new(config, driver).build().unwrap();
        (DeviceHandle::new(core), control)
    }

    #[tokio::test]
    async fn test_thread_starts_with_first_command() {
        let (device, _control) = device(DeviceConfig::new("Printer"));
        assert!(!device.is_started());
        assert_eq!(device.status().init_state, InitState::NotStarted);

        device.initialize().await.unwrap();
        assert!(device.is_started());

        let snapshot = device.snapshot().await.unwrap();
        assert_eq!(snapshot.init_state, InitState::Success);
        assert_eq!(device.status(), snapshot);

        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialized_signal() {
        let (device, _control) = device(DeviceConfig::new("Printer"));
        let mut events = device.subscribe(Signal::Initialized, "host").unwrap();
        assert!(device.subscribe(Signal::Initialized, "host").is_none());

        device.initialize().await.unwrap();
        assert_eq!(events.recv().await, Some(DeviceEvent::Initialized));

        assert!(device.unsubscribe(Signal::Initialized, "host"));
        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_runs_on_device_thread() {
        let (device, _control) = device(DeviceConfig::new("Printer"));

        let (thread, device_type) = device
            .execute(|driver, _ctx| {
                let thread = std::thread::current().name().map(str::to_string);
                (thread, driver.device_type())
            })
            .await
            .unwrap();

        assert_eq!(thread.as_deref(), Some("device-Printer"));
        assert_eq!(device_type, DeviceType::Printer);
        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_reports_disconnection() {
        let (device, control) = device(DeviceConfig::new("Printer"));
        device.initialize().await.unwrap();

        assert!(device.poll().await.unwrap().contains_code(ok::OK));

        control.set_connected(false);
        let collection = device.poll().await.unwrap();
        assert!(collection.contains_code(error::NOT_AVAILABLE));
        assert!(!device.status().connected);

        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_is_current_when_request_returns() {
        let (device, control) = device(DeviceConfig::new("Printer"));
        device.initialize().await.unwrap();
        device.snapshot().await.unwrap();

        control.set_connected(false);
        assert!(!device.check_existence().await.unwrap());
        assert!(!device.status().connected);

        control.set_connected(true);
        assert!(device.check_existence().await.unwrap());
        assert!(device.status().connected);

        device.release(true).await.unwrap();
        let status = device.status();
        assert_eq!(status.init_state, InitState::NotStarted);
        assert!(!status.connected);

        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_polling_timer_drives_polls() {
        let (device, control) = device(
            DeviceConfig::new("Printer").with_polling_interval(Duration::from_millis(10)),
        );
        device.initialize().await.unwrap();

        let polled = tokio::time::timeout(Duration::from_secs(5), async {
            while control.status_calls() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(polled.is_ok());
        assert!(device.status().polling_active);

        device.stop_polling(true).await.unwrap();
        assert!(!device.snapshot().await.unwrap().polling_active);
        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_polling_configuration_errors() {
        let (device, _control) = device(DeviceConfig::new("Printer"));

        assert!(matches!(
            device.set_polling_interval(Duration::ZERO).await,
            Err(HardwareError::ConfigurationError { .. })
        ));
        assert!(device.start_polling(true).await.is_err());
        assert!(device.enqueue_post_poll_task(Box::new(|_, _| {})).await.is_err());

        device
            .set_polling_interval(Duration::from_secs(60))
            .await
            .unwrap();
        device.start_polling(false).await.unwrap();
        assert!(device.snapshot().await.unwrap().polling_active);

        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_operator_presence_parameter_defers_reidentification() {
        let (device, control) = device(DeviceConfig::new("Printer"));
        device.initialize().await.unwrap();
        device
            .set_parameter(PARAM_OPERATOR_PRESENCE, true)
            .await
            .unwrap();

        control.set_connected(false);
        device.poll().await.unwrap();
        let identified = control.identify_calls();
        control.set_connected(true);
        device.poll().await.unwrap();

        // Deferred work runs right after the poll, on the same thread.
        let snapshot = device.snapshot().await.unwrap();
        assert_eq!(snapshot.init_state, InitState::Success);
        assert!(control.identify_calls() > identified);

        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_and_commands_after_shutdown() {
        let (device, control) = device(DeviceConfig::new("Printer"));
        device.initialize().await.unwrap();

        device.release(true).await.unwrap();
        assert_eq!(device.snapshot().await.unwrap().init_state, InitState::NotStarted);

        device.shutdown().await.unwrap();
        assert!(matches!(
            device.poll().await,
            Err(HardwareError::WorkerStopped { .. })
        ));
        assert!(control.release_calls() >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (device, control) = device(DeviceConfig::new("Printer"));

        device.shutdown().await.unwrap();

        assert_eq!(control.release_calls(), 1);
        assert!(device.check_existence().await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_one_device() {
        let (device, control) = device(DeviceConfig::new("Printer"));
        let other = device.clone();

        let (a, b) = tokio::join!(device.check_existence(), other.check_existence());
        assert!(a.unwrap() && b.unwrap());
        assert_eq!(control.identify_calls(), 2);
        assert_eq!(other.id(), device.id());

        device.shutdown().await.unwrap();
    }
}
