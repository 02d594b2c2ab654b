//! USB transport binding.
//!
//! USB devices announce their vendor and product identifiers, so instead
//! of negotiating line settings the binding matches enumerated endpoints
//! against the driver's [`DetectingData`] and claims the first free match.
//! A USB device that loses power disappears from the bus: on
//! `Error::NOT_AVAILABLE` the port is closed so the next poll re-opens it,
//! and a power supply error is treated as a transient, bufferable blip.

use super::detect::{DetectingCursor, DetectingData, ProductData};
use super::port::{EndpointInfo, IoPort, TransportKind};
use super::registry::{EndpointClaim, EndpointRegistry};
use crate::Result;
use crate::status::{StatusCodes, codes::error};
use kiosk_core::DeviceParameters;
use kiosk_core::constants::PARAM_SYSTEM_NAME;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration of a USB or libusb binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbSettings {
    /// Products the driver recognizes. Empty accepts any device.
    pub detecting_data: DetectingData,
    /// The driver talks to the device through the port. When `false` a
    /// third-party driver owns the device and no endpoint is claimed.
    pub port_using: bool,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            detecting_data: DetectingData::new(),
            port_using: true,
        }
    }
}

impl UsbSettings {
    pub fn new(detecting_data: DetectingData) -> Self {
        Self {
            detecting_data,
            ..Self::default()
        }
    }

    pub fn with_port_using(mut self, port_using: bool) -> Self {
        self.port_using = port_using;
        self
    }
}

/// Endpoint matching shared by the USB and libusb bindings.
#[derive(Debug)]
pub(crate) struct UsbEndpoints {
    settings: UsbSettings,
    port: Box<dyn IoPort>,
    claim: EndpointClaim,
    product: Option<ProductData>,
    detecting: Option<DetectingCursor<EndpointInfo>>,
}

impl UsbEndpoints {
    pub(crate) fn new(
        kind: TransportKind,
        settings: UsbSettings,
        port: Box<dyn IoPort>,
        registry: Arc<EndpointRegistry>,
        owner: Uuid,
    ) -> Self {
        Self {
            settings,
            port,
            claim: EndpointClaim::new(registry, kind, owner),
            product: None,
            detecting: None,
        }
    }

    pub(crate) fn kind(&self) -> TransportKind {
        self.claim.kind()
    }

    pub(crate) fn settings(&self) -> &UsbSettings {
        &self.settings
    }

    pub(crate) fn port(&mut self) -> Option<&mut dyn IoPort> {
        if self.settings.port_using {
            Some(self.port.as_mut())
        } else {
            None
        }
    }

    pub(crate) fn product(&self) -> Option<&ProductData> {
        self.product.as_ref()
    }

    fn accepts(data: &DetectingData, info: &EndpointInfo) -> bool {
        data.is_empty() || data.matches(info)
    }

    pub(crate) fn check_connection_ability(&mut self) -> bool {
        if !self.settings.port_using {
            return true;
        }

        if self.claim.claimed().is_none() {
            let endpoints = self.port.available_endpoints();
            self.claim.sync(endpoints);

            let data = &self.settings.detecting_data;
            let Some(info) = self.claim.claim_first_free(|info| Self::accepts(data, info)) else {
                warn!("No free {} device matches the detecting data", self.kind());
                return false;
            };
            self.product = data.product_for(&info).cloned();
        }

        match self.open_claimed() {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot open {} device: {e}", self.kind());
                self.claim.release();
                self.product = None;
                false
            }
        }
    }

    fn open_claimed(&mut self) -> Result<()> {
        if let Some(id) = self.claim.claimed() {
            self.port.set_endpoint(id)?;
        }
        self.port.open()
    }

    pub(crate) fn on_status(&mut self, codes: &StatusCodes) {
        if codes.contains(&error::NOT_AVAILABLE) && self.port.is_open() {
            debug!("{} device is not available, closing the port", self.kind());
            if let Err(e) = self.port.close() {
                warn!("Failed to close {} port: {e}", self.kind());
            }
        }
    }

    pub(crate) fn begin_detecting(&mut self) -> usize {
        if !self.settings.port_using {
            self.detecting = Some(DetectingCursor::new(Vec::new()));
            return 0;
        }

        let endpoints = self.port.available_endpoints();
        self.claim.sync(endpoints);

        let data = &self.settings.detecting_data;
        let cursor = DetectingCursor::new(self.claim.free_endpoints(|info| Self::accepts(data, info)));
        let count = cursor.len();
        self.detecting = Some(cursor);
        count
    }

    pub(crate) fn move_next(&mut self) -> bool {
        loop {
            let next = match self.detecting.as_mut() {
                Some(cursor) => cursor.move_next().cloned(),
                None => return false,
            };
            let Some(info) = next else {
                self.claim.release();
                self.product = None;
                let _ = self.port.close();
                return false;
            };

            if self.claim.claim(&info.id).is_err() {
                continue;
            }
            self.product = self.settings.detecting_data.product_for(&info).cloned();
            match self.open_claimed() {
                Ok(()) => return true,
                Err(e) => debug!("{} device {} skipped: {e}", self.kind(), info.id),
            }
        }
    }

    pub(crate) fn claim_current(&mut self) {
        self.detecting = None;
        if let Some(id) = self.claim.claimed() {
            info!("{} device {id} found", self.kind());
        }
    }

    pub(crate) fn release(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close {} port: {e}", self.kind());
        }
        self.claim.release();
        self.product = None;
        self.detecting = None;
    }

    pub(crate) fn device_data(&self) -> DeviceParameters {
        let mut data = DeviceParameters::new();
        if let Some(id) = self.claim.claimed() {
            data.set(PARAM_SYSTEM_NAME, id.to_string());
        }
        data
    }
}

/// A device on the USB bus behind a system driver, claimed by device
/// object name.
#[derive(Debug)]
pub struct UsbBinding(UsbEndpoints);

impl UsbBinding {
    pub fn new(
        settings: UsbSettings,
        port: Box<dyn IoPort>,
        registry: Arc<EndpointRegistry>,
        owner: Uuid,
    ) -> Self {
        Self(UsbEndpoints::new(TransportKind::Usb, settings, port, registry, owner))
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

    /// Product matched when the endpoint was claimed.
    #[must_use]
    pub fn product(&self) -> Option<&ProductData> {
        self.0.product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPort, MockPortHandle};

    fn detecting_data() -> DetectingData {
        let mut data = DetectingData::new();
        data.add(0x0dd4, 0x0015, "Custom VKP80", true);
        data.add(0x0dd4, 0x0205, "Custom TG2480", false);
        data
    }

    fn binding(settings: UsbSettings) -> (UsbBinding, MockPortHandle, Arc<EndpointRegistry>) {
        let registry = EndpointRegistry::shared();
        let (port, handle) = MockPort::new(TransportKind::Usb);
        handle.set_endpoints(vec![
            EndpointInfo::new("pdo-1").with_usb_ids(0x1111, 0x0001),
            EndpointInfo::new("pdo-2").with_usb_ids(0x0dd4, 0x0205),
            EndpointInfo::new("pdo-3").with_usb_ids(0x0dd4, 0x0015),
        ]);
        let binding = UsbBinding::new(settings, Box::new(port), registry.clone(), Uuid::new_v4());
        (binding, handle, registry)
    }

    #[test]
    fn test_claims_first_matching_device() {
        let (mut binding, handle, registry) = binding(UsbSettings::new(detecting_data()));

        assert!(binding.endpoints().check_connection_ability());
        assert_eq!(handle.endpoint().as_deref(), Some("pdo-2"));
        assert_eq!(binding.product().unwrap().model, "Custom TG2480");
        assert!(!binding.product().unwrap().verified);
        assert!(!registry.is_free(TransportKind::Usb, &"pdo-2".into()));
    }

    #[test]
    fn test_skips_devices_claimed_by_others() {
        let (mut binding, handle, registry) = binding(UsbSettings::new(detecting_data()));
        registry.sync(
            TransportKind::Usb,
            vec![EndpointInfo::new("pdo-2").with_usb_ids(0x0dd4, 0x0205)],
        );
        registry
            .claim(TransportKind::Usb, &"pdo-2".into(), Uuid::new_v4())
            .unwrap();

        assert!(binding.endpoints().check_connection_ability());
        assert_eq!(handle.endpoint().as_deref(), Some("pdo-3"));
    }

    #[test]
    fn test_no_matching_device() {
        let mut data = DetectingData::new();
        data.add(0x2222, 0x0001, "Other", true);
        let (mut binding, handle, _registry) = binding(UsbSettings::new(data));

        assert!(!binding.endpoints().check_connection_ability());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_port_using_bypass() {
        let settings = UsbSettings::new(detecting_data()).with_port_using(false);
        let (mut binding, handle, registry) = binding(settings);

        assert!(binding.endpoints().check_connection_ability());
        assert!(binding.endpoints().port().is_none());
        assert!(!handle.is_open());
        assert!(registry.snapshot(TransportKind::Usb).is_empty());
    }

    #[test]
    fn test_not_available_closes_port() {
        let (mut binding, handle, _registry) = binding(UsbSettings::new(detecting_data()));
        assert!(binding.endpoints().check_connection_ability());

        binding.endpoints().on_status(&[error::MECHANISM].into());
        assert!(handle.is_open());

        binding.endpoints().on_status(&[error::NOT_AVAILABLE].into());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_release_returns_claim() {
        let (mut binding, _handle, registry) = binding(UsbSettings::new(detecting_data()));
        assert!(binding.endpoints().check_connection_ability());

        binding.endpoints().release();
        assert!(registry.is_free(TransportKind::Usb, &"pdo-2".into()));
        assert!(binding.product().is_none());
    }

    #[test]
    fn test_detecting_over_matching_devices() {
        let (mut binding, handle, _registry) = binding(UsbSettings::new(detecting_data()));

        assert_eq!(binding.endpoints().begin_detecting(), 2);
        assert!(binding.endpoints().move_next());
        assert_eq!(handle.endpoint().as_deref(), Some("pdo-2"));
        assert!(binding.endpoints().move_next());
        assert_eq!(binding.product().unwrap().model, "Custom VKP80");

        binding.endpoints().claim_current();
        assert_eq!(
            binding.endpoints_ref().device_data().text(PARAM_SYSTEM_NAME),
            Some("pdo-3")
        );
    }
}
