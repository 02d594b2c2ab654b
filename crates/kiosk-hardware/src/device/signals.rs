//! Named device signals and their subscribers.
//!
//! A device exposes two signals: [`Signal::Status`], carrying a
//! [`StatusSignal`], and [`Signal::Initialized`]. A receiver connects to a
//! signal under a name; connecting the same receiver to the same signal
//! twice is refused, mirroring a unique signal/slot connection.

use crate::status::StatusSignal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Signals a device emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Status,
    Initialized,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Initialized => write!(f, "initialized"),
        }
    }
}

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceEvent {
    Status(StatusSignal),
    Initialized,
}

impl DeviceEvent {
    #[must_use]
    pub fn signal(&self) -> Signal {
        match self {
            Self::Status(_) => Signal::Status,
            Self::Initialized => Signal::Initialized,
        }
    }
}

type Connections = BTreeMap<(Signal, String), mpsc::UnboundedSender<DeviceEvent>>;

/// Subscriber registry of one device.
#[derive(Debug, Default)]
pub struct SignalHub {
    connections: Mutex<Connections>,
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> MutexGuard<'_, Connections> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect `receiver` to `signal`.
    ///
    /// Returns `None` if this receiver is already connected to the signal.
    /// A connection whose receiving end was dropped counts as gone.
    pub fn subscribe(
        &self,
        signal: Signal,
        receiver: impl Into<String>,
    ) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        let key = (signal, receiver.into());
        let mut connections = self.connections();

        if connections.get(&key).is_some_and(|sender| !sender.is_closed()) {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        debug!("Receiver {} connected to {signal} signal", key.1);
        connections.insert(key, tx);
        Some(rx)
    }

    /// Disconnect `receiver` from `signal`. Returns `false` if it was not connected.
    pub fn unsubscribe(&self, signal: Signal, receiver: &str) -> bool {
        self.connections()
            .remove(&(signal, receiver.to_string()))
            .is_some()
    }

    #[must_use]
    pub fn is_connected(&self, signal: Signal, receiver: &str) -> bool {
        self.connections()
            .get(&(signal, receiver.to_string()))
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Number of live connections to `signal`.
    #[must_use]
    pub fn receiver_count(&self, signal: Signal) -> usize {
        self.connections()
            .iter()
            .filter(|((connected, _), sender)| *connected == signal && !sender.is_closed())
            .count()
    }

    /// Deliver an event to every receiver of its signal, dropping
    /// connections whose receiver is gone.
    pub fn emit(&self, event: DeviceEvent) {
        let signal = event.signal();
        trace!("Emitting {signal} signal: {event:?}");

        self.connections().retain(|(connected, receiver), sender| {
            if *connected != signal {
                return true;
            }
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                debug!("Receiver {receiver} of {signal} signal is gone");
            }
            delivered
        });
    }

    pub fn emit_status(&self, status: StatusSignal) {
        self.emit(DeviceEvent::Status(status));
    }

    pub fn emit_initialized(&self) {
        self.emit(DeviceEvent::Initialized);
    }
}
