//! libusb transport binding.
//!
//! Same matching and claiming rules as [`UsbBinding`](super::UsbBinding),
//! over the libusb pool where endpoints are keyed by bus and address.

use super::detect::ProductData;
use super::port::{IoPort, TransportKind};
use super::registry::EndpointRegistry;
use super::usb::{UsbEndpoints, UsbSettings};
use std::sync::Arc;
use uuid::Uuid;

/// A device driven directly through libusb.
#[derive(Debug)]
pub struct LibUsbBinding(UsbEndpoints);

impl LibUsbBinding {
    pub fn new(
        settings: UsbSettings,
        port: Box<dyn IoPort>,
        registry: Arc<EndpointRegistry>,
        owner: Uuid,
    ) -> Self {
        // libusb always talks to the device itself.
        let settings = settings.with_port_using(true);
        Self(UsbEndpoints::new(TransportKind::LibUsb, settings, port, registry, owner))
    }

    pub(crate) fn endpoints(&mut self) -> &mut UsbEndpoints {
        &mut self.0
    }

    pub(crate) fn endpoints_ref(&self) -> &UsbEndpoints {
        &self.0
    }

    #[must_use]
    pub fn settings(&self) -> &UsbSettings {
        self.0.settings()
    }

    #[must_use]
    pub fn product(&self) -> Option<&ProductData> {
        self.0.product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;
    use crate::transport::{DetectingData, EndpointInfo};

    #[test]
    fn test_libusb_claims_from_its_own_pool() {
        let registry = EndpointRegistry::shared();
        let (port, handle) = MockPort::new(TransportKind::LibUsb);
        handle.set_endpoints(vec![EndpointInfo::new("1:4").with_usb_ids(0x04b8, 0x0e15)]);

        let mut data = DetectingData::new();
        data.add(0x04b8, 0x0e15, "Epson TM-T20", true);
        let settings = UsbSettings::new(data).with_port_using(false);
        let mut binding = LibUsbBinding::new(settings, Box::new(port), registry.clone(), Uuid::new_v4());

        assert!(binding.settings().port_using);
        assert!(binding.endpoints().check_connection_ability());
        assert_eq!(binding.product().unwrap().model, "Epson TM-T20");
        assert!(!registry.is_free(TransportKind::LibUsb, &"1:4".into()));
        assert!(registry.is_free(TransportKind::Usb, &"1:4".into()));
        assert!(binding.endpoints_ref().device_data().contains("system_name"));
    }
}
