//! Device lifecycle configuration.
//!
//! [`DeviceConfig`] gathers the knobs of one device slot: identity defaults,
//! history depth, retry and debounce budgets, polling interval and release
//! timing. Every field has a default, so a configuration file only needs to
//! name what differs:
//!
//! ```
//! use kiosk_core::DeviceConfig;
//!
//! let config = DeviceConfig::from_json_str(r#"{ "max_bad_answers": 2, "polling_interval_ms": 500 }"#)?;
//!
//! assert_eq!(config.max_bad_answers, 2);
//! assert_eq!(config.history_size, 10);
//! assert!(config.polling_interval().is_some());
//! # Ok::<(), kiosk_core::Error>(())
//! ```

use crate::constants::*;
use crate::{DeviceParameters, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration of one device slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name used until the driver identifies the model.
    pub name: String,

    /// Number of status snapshots kept in the history.
    pub history_size: usize,

    /// Parameter update attempts per initialization.
    pub initialize_repeat_count: u32,

    /// Consecutive bad answers masked by the status buffer (0 disables it).
    pub max_bad_answers: u32,

    /// Apply the status buffer even when an operator is present.
    pub force_status_buffer: bool,

    /// A live operator session (service menu) is active.
    pub operator_presence: bool,

    /// The device may be found by auto-detection.
    pub auto_detectable: bool,

    /// Polling interval; `None` means the device is only polled on demand.
    pub polling_interval_ms: Option<u64>,

    /// Start the polling timer once initialization finishes.
    pub start_polling_on_initialize: bool,

    /// How long release waits for an in-flight poll.
    pub release_timeout_ms: u64,

    /// Status codes never reported to the host.
    pub excess_status_codes: Vec<u32>,

    /// Initial device parameters (plugin path, host version...).
    pub parameters: DeviceParameters,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            history_size: DEFAULT_HISTORY_SIZE,
            initialize_repeat_count: DEFAULT_INITIALIZE_REPEAT_COUNT,
            max_bad_answers: DEFAULT_MAX_BAD_ANSWERS,
            force_status_buffer: false,
            operator_presence: false,
            auto_detectable: true,
            polling_interval_ms: None,
            start_polling_on_initialize: true,
            release_timeout_ms: DEFAULT_RELEASE_TIMEOUT_MS,
            excess_status_codes: Vec::new(),
            parameters: DeviceParameters::new(),
        }
    }
}

impl DeviceConfig {
    /// Create a configuration with a device name and default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Enable periodic polling.
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the status buffer budget.
    #[must_use]
    pub fn with_max_bad_answers(mut self, max_bad_answers: u32) -> Self {
        self.max_bad_answers = max_bad_answers;
        self
    }

    /// Set the number of parameter update attempts.
    #[must_use]
    pub fn with_initialize_repeat_count(mut self, count: u32) -> Self {
        self.initialize_repeat_count = count;
        self
    }

    /// Mark an operator session as active.
    #[must_use]
    pub fn with_operator_presence(mut self, presence: bool) -> Self {
        self.operator_presence = presence;
        self
    }

    /// Set an initial device parameter.
    #[must_use]
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::ParameterValue>,
    ) -> Self {
        self.parameters.set(name, value);
        self
    }

    /// Polling interval, if polling is enabled.
    #[must_use]
    pub fn polling_interval(&self) -> Option<Duration> {
        self.polling_interval_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero history size, a zero repeat count
    /// or a zero polling interval.
    pub fn validate(&self) -> Result<()> {
        if self.history_size == 0 {
            return Err(Error::Config("history_size must be positive".to_string()));
        }
        if self.initialize_repeat_count == 0 {
            return Err(Error::Config(
                "initialize_repeat_count must be positive".to_string(),
            ));
        }
        if self.polling_interval_ms == Some(0) {
            return Err(Error::Config(
                "polling_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed input and [`Error::Config`] for
    /// out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DeviceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
