//! Device lifecycle, polling and the per-device thread.
//!
//! A device is assembled with a [`DeviceBuilder`] into a [`DeviceCore`],
//! which runs every lifecycle step synchronously. Wrapping the core in a
//! [`DeviceHandle`] moves it onto its own thread; from then on the handle is
//! the only way in.

mod core;
mod driver;
mod expect;
mod handle;
mod polling;
mod signals;
mod worker;

pub use self::core::{DeferredTask, DeviceBuilder, DeviceCore, DeviceSnapshot};
pub use driver::{DeviceDriver, DriverContext, DriverTask};
pub use expect::{PollingExpector, WaitPolicy};
pub use handle::DeviceHandle;
pub use polling::PollingPolicy;
pub use signals::{DeviceEvent, Signal, SignalHub};
