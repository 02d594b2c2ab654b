//! Serial transport binding.
//!
//! A serial device is bound to one named port claimed from the serial
//! pool. Because a serial device cannot announce its line settings, the
//! binding offers the cartesian product of the configured settings as
//! candidates; identification tries them in turn until the device answers.

use super::detect::DetectingCursor;
use super::port::{DtrControl, EndpointId, EndpointInfo, IoPort, Parity, PortParameters, RtsControl};
use super::registry::{EndpointClaim, EndpointRegistry};
use super::TransportKind;
use crate::Result;
use kiosk_core::DeviceParameters;
use kiosk_core::constants::{PARAM_OPTIONAL_PORT_SETTINGS, PARAM_PORT_NAME};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Line settings to negotiate, each list in order of preference.
///
/// RTS and DTR are optional settings: unless optional port settings are
/// enabled only their first choice is tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialParameterSpace {
    pub baud_rates: Vec<u32>,
    pub parities: Vec<Parity>,
    pub byte_sizes: Vec<u8>,
    pub rts: Vec<RtsControl>,
    pub dtr: Vec<DtrControl>,
}

impl Default for SerialParameterSpace {
    fn default() -> Self {
        let defaults = PortParameters::default();
        Self {
            baud_rates: vec![defaults.baud_rate],
            parities: vec![defaults.parity],
            byte_sizes: vec![defaults.byte_size],
            rts: vec![defaults.rts],
            dtr: vec![defaults.dtr],
        }
    }
}

impl SerialParameterSpace {
    /// Every combination to try, most preferred first.
    ///
    /// Empty lists fall back to the default setting so there is always at
    /// least one candidate.
    #[must_use]
    pub fn combinations(&self, optional_settings: bool) -> Vec<PortParameters> {
        let defaults = PortParameters::default();
        let baud_rates = or_default(&self.baud_rates, defaults.baud_rate);
        let parities = or_default(&self.parities, defaults.parity);
        let byte_sizes = or_default(&self.byte_sizes, defaults.byte_size);
        let mut rts = or_default(&self.rts, defaults.rts);
        let mut dtr = or_default(&self.dtr, defaults.dtr);

        if !optional_settings {
            rts.truncate(1);
            dtr.truncate(1);
        }

        let mut result = Vec::with_capacity(
            baud_rates.len() * parities.len() * byte_sizes.len() * rts.len() * dtr.len(),
        );
        for &baud_rate in &baud_rates {
            for &parity in &parities {
                for &byte_size in &byte_sizes {
                    for &rts in &rts {
                        for &dtr in &dtr {
                            result.push(PortParameters {
                                baud_rate,
                                parity,
                                byte_size,
                                rts,
                                dtr,
                            });
                        }
                    }
                }
            }
        }
        result
    }
}

fn or_default<T: Copy>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}

/// Configuration of a serial binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port to use; `None` until configured or found by auto-detection.
    pub port_name: Option<String>,
    pub parameters: SerialParameterSpace,
    /// Negotiate RTS and DTR too.
    pub optional_port_settings: bool,
}

impl SerialSettings {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: Some(port_name.into()),
            ..Self::default()
        }
    }

    pub fn with_baud_rates(mut self, baud_rates: Vec<u32>) -> Self {
        self.parameters.baud_rates = baud_rates;
        self
    }

    pub fn with_optional_port_settings(mut self, enabled: bool) -> Self {
        self.optional_port_settings = enabled;
        self
    }
}

/// A device bound to a serial port.
#[derive(Debug)]
pub struct SerialBinding {
    settings: SerialSettings,
    port: Box<dyn IoPort>,
    claim: EndpointClaim,
    applied: Option<PortParameters>,
    detecting: Option<DetectingCursor<EndpointInfo>>,
}

impl SerialBinding {
    pub fn new(
        settings: SerialSettings,
        port: Box<dyn IoPort>,
        registry: Arc<EndpointRegistry>,
        owner: Uuid,
    ) -> Self {
        Self {
            settings,
            port,
            claim: EndpointClaim::new(registry, TransportKind::Serial, owner),
            applied: None,
            detecting: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Line settings applied last.
    #[must_use]
    pub fn applied_parameters(&self) -> Option<PortParameters> {
        self.applied
    }

    pub fn port(&mut self) -> &mut dyn IoPort {
        self.port.as_mut()
    }

    fn target_endpoint(&self) -> Option<EndpointId> {
        self.claim
            .claimed()
            .cloned()
            .or_else(|| self.settings.port_name.as_deref().map(EndpointId::from))
    }

    /// Claim the configured port and open it.
    pub fn check_connection_ability(&mut self) -> bool {
        let Some(id) = self.target_endpoint() else {
            warn!("Serial port is not configured");
            return false;
        };

        if let Err(e) = self.claim.claim(&id) {
            warn!("Cannot claim serial port {id}: {e}");
            return false;
        }

        match self.open_on(&id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot open serial port {id}: {e}");
                self.claim.release();
                false
            }
        }
    }

    fn open_on(&mut self, id: &EndpointId) -> Result<()> {
        self.port.set_endpoint(id)?;
        self.port.open()
    }

    /// Pick up port settings from device parameters.
    pub fn prepare(&mut self, parameters: &DeviceParameters) {
        if let Some(port_name) = parameters.text(PARAM_PORT_NAME) {
            self.settings.port_name = Some(port_name.to_string());
        }
        if let Some(enabled) = parameters.flag(PARAM_OPTIONAL_PORT_SETTINGS) {
            self.settings.optional_port_settings = enabled;
        }
    }

    /// Line settings to try during identification.
    ///
    /// The settings applied last come first: a device that answered once
    /// most likely still uses them.
    #[must_use]
    pub fn parameter_candidates(&self) -> Vec<PortParameters> {
        let mut candidates = self
            .settings
            .parameters
            .combinations(self.settings.optional_port_settings);

        if let Some(applied) = self.applied
            && let Some(position) = candidates.iter().position(|candidate| *candidate == applied)
        {
            let preferred = candidates.remove(position);
            candidates.insert(0, preferred);
        }
        candidates
    }

    /// # Errors
    ///
    /// Returns the port's error if the settings cannot be applied.
    pub fn apply_parameters(&mut self, parameters: &PortParameters) -> Result<()> {
        self.port.set_parameters(parameters)?;
        debug!("Serial port parameters applied: {parameters}");
        self.applied = Some(*parameters);
        Ok(())
    }

    /// Someone changed the line settings behind the device's back.
    ///
    /// The new settings are adopted, so one change is reported once.
    pub fn environment_changed(&mut self) -> bool {
        match (self.applied, self.port.parameters()) {
            (Some(applied), Some(current)) if applied != current => {
                info!("Serial port parameters changed: {applied} -> {current}");
                self.applied = Some(current);
                true
            }
            _ => false,
        }
    }

    /// Enumerate free ports for auto-detection. Returns the candidate count.
    pub fn begin_detecting(&mut self) -> usize {
        let endpoints = self.port.available_endpoints();
        self.claim.sync(endpoints);

        let cursor = DetectingCursor::new(self.claim.free_endpoints(|_| true));
        let count = cursor.len();
        self.detecting = Some(cursor);
        count
    }

    /// Claim and open the next free port.
    pub fn move_next(&mut self) -> bool {
        loop {
            let next = match self.detecting.as_mut() {
                Some(cursor) => cursor.move_next().cloned(),
                None => return false,
            };
            let Some(info) = next else {
                self.claim.release();
                let _ = self.port.close();
                return false;
            };

            if self.claim.claim(&info.id).is_err() {
                continue;
            }
            match self.open_on(&info.id) {
                Ok(()) => return true,
                Err(e) => debug!("Serial port {} skipped: {e}", info.id),
            }
        }
    }

    /// Keep the port found by auto-detection.
    pub fn claim_current(&mut self) {
        self.detecting = None;
        if let Some(id) = self.claim.claimed() {
            self.settings.port_name = Some(id.to_string());
        }
    }

    /// Close the port and return the claim.
    pub fn release(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close serial port: {e}");
        }
        self.claim.release();
        self.detecting = None;
    }

    pub fn device_data(&self) -> DeviceParameters {
        let mut data = DeviceParameters::new();
        if let Some(id) = self.target_endpoint() {
            data.set(PARAM_PORT_NAME, id.to_string());
        }
        if let Some(applied) = self.applied {
            data.set("port_parameters", applied.to_string());
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;

    fn binding(settings: SerialSettings) -> (SerialBinding, crate::mock::MockPortHandle, Arc<EndpointRegistry>) {
        let registry = EndpointRegistry::shared();
        let (port, handle) = MockPort::new(TransportKind::Serial);
        let binding = SerialBinding::new(settings, Box::new(port), registry.clone(), Uuid::new_v4());
        (binding, handle, registry)
    }

    #[test]
    fn test_combinations_without_optional_settings() {
        let space = SerialParameterSpace {
            baud_rates: vec![9600, 19200, 115_200],
            parities: vec![Parity::None, Parity::Even],
            byte_sizes: vec![8],
            rts: vec![RtsControl::Enable, RtsControl::Disable],
            dtr: vec![DtrControl::Enable, DtrControl::Disable],
        };

        let combinations = space.combinations(false);
        assert_eq!(combinations.len(), 6);
        assert!(combinations.iter().all(|p| p.rts == RtsControl::Enable));
        assert!(combinations.iter().all(|p| p.dtr == DtrControl::Enable));
        assert_eq!(combinations[0].baud_rate, 9600);
        assert_eq!(combinations[0].parity, Parity::None);
        assert_eq!(combinations[1].parity, Parity::Even);
    }

    #[test]
    fn test_combinations_with_optional_settings() {
        let space = SerialParameterSpace {
            baud_rates: vec![9600, 19200],
            rts: vec![RtsControl::Enable, RtsControl::Disable],
            dtr: vec![DtrControl::Enable, DtrControl::Disable],
            ..SerialParameterSpace::default()
        };

        assert_eq!(space.combinations(true).len(), 8);
    }

    #[test]
    fn test_empty_space_falls_back_to_default() {
        let space = SerialParameterSpace {
            baud_rates: Vec::new(),
            parities: Vec::new(),
            byte_sizes: Vec::new(),
            rts: Vec::new(),
            dtr: Vec::new(),
        };

        assert_eq!(space.combinations(true), vec![PortParameters::default()]);
    }

    #[test]
    fn test_check_connection_ability_claims_configured_port() {
        let (mut binding, handle, registry) = binding(SerialSettings::new("COM3"));

        assert!(binding.check_connection_ability());
        assert!(handle.is_open());
        assert_eq!(handle.endpoint().as_deref(), Some("COM3"));
        assert!(!registry.is_free(TransportKind::Serial, &"COM3".into()));

        binding.release();
        assert!(!handle.is_open());
        assert!(registry.is_free(TransportKind::Serial, &"COM3".into()));
    }

    #[test]
    fn test_check_connection_ability_without_port_name() {
        let (mut binding, _handle, _registry) = binding(SerialSettings::default());
        assert!(!binding.check_connection_ability());
    }

    #[test]
    fn test_check_connection_ability_busy_port() {
        let (mut binding, handle, registry) = binding(SerialSettings::new("COM3"));
        registry
            .claim(TransportKind::Serial, &"COM3".into(), Uuid::new_v4())
            .unwrap();

        assert!(!binding.check_connection_ability());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_open_failure_returns_claim() {
        let (mut binding, handle, registry) = binding(SerialSettings::new("COM3"));
        handle.set_open_fails(true);

        assert!(!binding.check_connection_ability());
        assert!(registry.is_free(TransportKind::Serial, &"COM3".into()));
    }

    #[test]
    fn test_prepare_reads_parameters() {
        let (mut binding, _handle, _registry) = binding(SerialSettings::default());
        let parameters = DeviceParameters::new()
            .with(PARAM_PORT_NAME, "/dev/ttyS1")
            .with(PARAM_OPTIONAL_PORT_SETTINGS, true);

        binding.prepare(&parameters);

        assert_eq!(binding.settings().port_name.as_deref(), Some("/dev/ttyS1"));
        assert!(binding.settings().optional_port_settings);
    }

    #[test]
    fn test_applied_parameters_are_tried_first() {
        let settings = SerialSettings::new("COM1").with_baud_rates(vec![9600, 19200, 38400]);
        let (mut binding, _handle, _registry) = binding(settings);

        let third = binding.parameter_candidates()[2];
        binding.apply_parameters(&third).unwrap();

        let candidates = binding.parameter_candidates();
        assert_eq!(candidates[0].baud_rate, 38400);
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_environment_changed_on_foreign_parameters() {
        let (mut binding, handle, _registry) = binding(SerialSettings::new("COM1"));
        binding.apply_parameters(&PortParameters::default()).unwrap();
        assert!(!binding.environment_changed());

        handle.set_parameters(PortParameters {
            baud_rate: 115_200,
            ..PortParameters::default()
        });
        assert!(binding.environment_changed());
        assert!(!binding.environment_changed());
        assert_eq!(binding.applied_parameters().unwrap().baud_rate, 115_200);
    }

    #[test]
    fn test_detecting_walks_free_ports() {
        let (mut binding, handle, registry) = binding(SerialSettings::default());
        handle.set_endpoints(vec![
            EndpointInfo::new("COM1"),
            EndpointInfo::new("COM2"),
            EndpointInfo::new("COM3"),
        ]);
        registry.sync(
            TransportKind::Serial,
            vec![EndpointInfo::new("COM1"), EndpointInfo::new("COM2")],
        );
        registry
            .claim(TransportKind::Serial, &"COM2".into(), Uuid::new_v4())
            .unwrap();

        assert_eq!(binding.begin_detecting(), 2);
        assert!(binding.move_next());
        assert_eq!(handle.endpoint().as_deref(), Some("COM1"));
        assert!(binding.move_next());
        assert_eq!(handle.endpoint().as_deref(), Some("COM3"));
        assert!(registry.is_free(TransportKind::Serial, &"COM1".into()));

        binding.claim_current();
        assert_eq!(binding.settings().port_name.as_deref(), Some("COM3"));
        assert!(!registry.is_free(TransportKind::Serial, &"COM3".into()));
    }

    #[test]
    fn test_detecting_exhausted_releases_claim() {
        let (mut binding, handle, registry) = binding(SerialSettings::default());
        handle.set_endpoints(vec![EndpointInfo::new("COM1")]);

        binding.begin_detecting();
        assert!(binding.move_next());
        assert!(!binding.move_next());
        assert!(registry.is_free(TransportKind::Serial, &"COM1".into()));
    }

    #[test]
    fn test_device_data() {
        let (mut binding, _handle, _registry) = binding(SerialSettings::new("COM7"));
        binding.apply_parameters(&PortParameters::default()).unwrap();

        let data = binding.device_data();
        assert_eq!(data.text(PARAM_PORT_NAME), Some("COM7"));
        assert!(data.text("port_parameters").unwrap().starts_with("9600 baud"));
    }
}
