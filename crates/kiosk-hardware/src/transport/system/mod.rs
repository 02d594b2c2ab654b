//! Ports backed by the operating system.
//!
//! Only compiled with the `hardware-serial` or `hardware-usb` features;
//! tests and the default build use [`MockPort`](crate::mock::MockPort).

#[cfg(feature = "hardware-usb")]
mod libusb;
#[cfg(feature = "hardware-serial")]
mod serial;

#[cfg(feature = "hardware-usb")]
pub use libusb::LibUsbPort;
#[cfg(feature = "hardware-serial")]
pub use serial::SystemSerialPort;
