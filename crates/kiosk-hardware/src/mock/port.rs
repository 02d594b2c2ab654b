//! Mock I/O port for testing and development.
//!
//! The port and its handle share one state: tests script the port through
//! the handle (presence, replies, failures) while the device under test
//! drives the port from its worker thread.

use crate::Result;
use crate::error::HardwareError;
use crate::transport::{EndpointId, EndpointInfo, IoPort, PortParameters, TransportKind};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct MockPortState {
    endpoint: Option<EndpointId>,
    open: bool,
    open_count: usize,
    open_fails: bool,
    exists: bool,
    connected: bool,
    parameters: PortParameters,
    endpoints: Vec<EndpointInfo>,
    pending: VecDeque<Vec<u8>>,
    replies: HashMap<Vec<u8>, Vec<u8>>,
    written: Vec<Vec<u8>>,
}

impl Default for MockPortState {
    fn default() -> Self {
        Self {
            endpoint: None,
            open: false,
            open_count: 0,
            open_fails: false,
            exists: true,
            connected: true,
            parameters: PortParameters::default(),
            endpoints: Vec::new(),
            pending: VecDeque::new(),
            replies: HashMap::new(),
            written: Vec::new(),
        }
    }
}

fn lock(state: &Mutex<MockPortState>) -> MutexGuard<'_, MockPortState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted port of any transport kind.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::mock::MockPort;
/// use kiosk_hardware::transport::{IoPort, TransportKind};
/// use std::time::Duration;
///
/// let (mut port, handle) = MockPort::new(TransportKind::Serial);
/// handle.set_reply(&[0x10, 0x04, 0x01], &[0x16]);
///
/// port.set_endpoint(&"COM1".into()).unwrap();
/// port.open().unwrap();
/// let answer = port.query(&[0x10, 0x04, 0x01], Duration::from_millis(50), 1).unwrap();
///
/// assert_eq!(answer, vec![0x16]);
/// assert_eq!(handle.written(), vec![vec![0x10, 0x04, 0x01]]);
/// ```
#[derive(Debug)]
pub struct MockPort {
    kind: TransportKind,
    state: Arc<Mutex<MockPortState>>,
}

impl MockPort {
    /// Create a mock port and the handle controlling it.
    pub fn new(kind: TransportKind) -> (Self, MockPortHandle) {
        let state = Arc::new(Mutex::new(MockPortState::default()));
        let port = Self {
            kind,
            state: state.clone(),
        };
        (port, MockPortHandle { state })
    }

    fn state(&self) -> MutexGuard<'_, MockPortState> {
        lock(&self.state)
    }
}

impl IoPort for MockPort {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn endpoint(&self) -> Option<EndpointId> {
        self.state().endpoint.clone()
    }

    fn set_endpoint(&mut self, endpoint: &EndpointId) -> Result<()> {
        let mut state = self.state();
        if state.endpoint.as_ref() != Some(endpoint) {
            state.open = false;
            state.endpoint = Some(endpoint.clone());
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.open_fails || !state.exists {
            return Err(HardwareError::disconnected(format!(
                "mock {} port cannot be opened",
                self.kind
            )));
        }
        if !state.open {
            state.open = true;
            state.open_count += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn is_exist(&mut self) -> bool {
        self.state().exists
    }

    fn device_connected(&mut self) -> bool {
        let state = self.state();
        state.exists && state.connected
    }

    fn read(&mut self, _timeout: Duration, _min_size: usize) -> Result<Vec<u8>> {
        let mut state = self.state();
        if !state.open {
            return Err(HardwareError::disconnected("mock port is closed"));
        }
        if !state.connected {
            return Ok(Vec::new());
        }
        Ok(state.pending.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(HardwareError::disconnected("mock port is closed"));
        }
        state.written.push(data.to_vec());
        if let Some(reply) = state.replies.get(data).cloned() {
            state.pending.push_back(reply);
        }
        Ok(())
    }

    fn parameters(&self) -> Option<PortParameters> {
        match self.kind {
            TransportKind::Serial => Some(self.state().parameters),
            _ => None,
        }
    }

    fn set_parameters(&mut self, parameters: &PortParameters) -> Result<()> {
        if self.kind != TransportKind::Serial {
            return Err(HardwareError::unsupported("line settings on a USB port"));
        }
        self.state().parameters = *parameters;
        Ok(())
    }

    fn available_endpoints(&mut self) -> Vec<EndpointInfo> {
        self.state().endpoints.clone()
    }
}

/// Controls a [`MockPort`] from tests.
#[derive(Debug, Clone)]
pub struct MockPortHandle {
    state: Arc<Mutex<MockPortState>>,
}

impl MockPortHandle {
    fn state(&self) -> MutexGuard<'_, MockPortState> {
        lock(&self.state)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Number of times the port went from closed to open.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.state().endpoint.as_ref().map(ToString::to_string)
    }

    pub fn set_open_fails(&self, fails: bool) {
        self.state().open_fails = fails;
    }

    /// Plug or unplug the endpoint. Unplugging closes the port.
    pub fn set_exists(&self, exists: bool) {
        let mut state = self.state();
        state.exists = exists;
        if !exists {
            state.open = false;
        }
    }

    /// Make the device answer or stay silent.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Change the line settings behind the device's back.
    pub fn set_parameters(&self, parameters: PortParameters) {
        self.state().parameters = parameters;
    }

    #[must_use]
    pub fn parameters(&self) -> PortParameters {
        self.state().parameters
    }

    pub fn set_endpoints(&self, endpoints: Vec<EndpointInfo>) {
        self.state().endpoints = endpoints;
    }

    /// Queue an answer for the next read.
    pub fn push_response(&self, response: &[u8]) {
        self.state().pending.push_back(response.to_vec());
    }

    /// Answer `response` every time `request` is written.
    pub fn set_reply(&self, request: &[u8], response: &[u8]) {
        self.state()
            .replies
            .insert(request.to_vec(), response.to_vec());
    }

    #[must_use]
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }
}
