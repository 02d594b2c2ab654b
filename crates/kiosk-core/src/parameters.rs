//! Named key/value device parameters.
//!
//! Drivers and the host exchange loosely typed configuration through a
//! [`DeviceParameters`] map: the model name found during identification,
//! the calling type of the current lifecycle call, the plugin path, the
//! host version used for mismatch detection, and so on. Well-known keys
//! live in [`constants`](crate::constants).
//!
//! # Examples
//!
//! ```
//! use kiosk_core::constants::{PARAM_MODEL_NAME, PARAM_OPERATOR_PRESENCE};
//! use kiosk_core::DeviceParameters;
//!
//! let mut parameters = DeviceParameters::new();
//! parameters.set(PARAM_MODEL_NAME, "Custom VKP-80");
//! parameters.set(PARAM_OPERATOR_PRESENCE, true);
//!
//! assert_eq!(parameters.text(PARAM_MODEL_NAME), Some("Custom VKP-80"));
//! assert_eq!(parameters.flag(PARAM_OPERATOR_PRESENCE), Some(true));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterValue::Bool(value) => write!(f, "{}", if *value { "yes" } else { "no" }),
            ParameterValue::Int(value) => write!(f, "{value}"),
            ParameterValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        ParameterValue::Int(i64::from(value))
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

/// String-keyed parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceParameters(BTreeMap<String, ParameterValue>);

impl DeviceParameters {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Remove a parameter, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<ParameterValue> {
        self.0.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    /// Returns `true` if the parameter exists and is not an empty string.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self.0.get(name) {
            Some(ParameterValue::Text(text)) => !text.is_empty(),
            Some(_) => true,
            None => false,
        }
    }

    /// Text value of a parameter.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParameterValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Boolean value of a parameter. Text values `"true"`/`"yes"`/`"1"` count as set.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            ParameterValue::Bool(value) => Some(*value),
            ParameterValue::Int(value) => Some(*value != 0),
            ParameterValue::Text(text) => Some(matches!(text.as_str(), "true" | "yes" | "1")),
        }
    }

    /// Integer value of a parameter.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            ParameterValue::Int(value) => Some(*value),
            ParameterValue::Text(text) => text.trim().parse().ok(),
            ParameterValue::Bool(_) => None,
        }
    }

    /// Text value of a parameter that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if the parameter is absent or empty,
    /// and [`Error::InvalidParameter`] if it is not text.
    pub fn require_text(&self, name: &str) -> Result<&str> {
        match self.0.get(name) {
            Some(ParameterValue::Text(text)) if !text.is_empty() => Ok(text.as_str()),
            Some(ParameterValue::Text(_)) | None => Err(Error::MissingParameter(name.to_string())),
            Some(other) => Err(Error::InvalidParameter {
                name: name.to_string(),
                message: format!("expected text, got {other}"),
            }),
        }
    }

    /// Copy every entry of `other` into this map.
    pub fn merge(&mut self, other: &DeviceParameters) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Append `"<label> <value>"` to a comma-separated extensible entry.
    ///
    /// Used to accumulate device data such as firmware details reported
    /// piece by piece during identification. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_core::DeviceParameters;
    ///
    /// let mut data = DeviceParameters::new();
    /// data.extend_entry("firmware", "version", "1.04");
    /// data.extend_entry("firmware", "date", "2021-03-02");
    /// assert_eq!(data.text("firmware"), Some("version 1.04, date 2021-03-02"));
    /// ```
    pub fn extend_entry(&mut self, entry: &str, label: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let addition = format!("{label} {value}");
        let merged = match self.text(entry) {
            Some(existing) if !existing.is_empty() => format!("{existing}, {addition}"),
            _ => addition,
        };
        self.set(entry, merged);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_set_and_get() {
        let mut parameters = DeviceParameters::new();
        parameters.set("model_name", "VKP-80");
        parameters.set("retries", 3u32);

        assert_eq!(parameters.text("model_name"), Some("VKP-80"));
        assert_eq!(parameters.int("retries"), Some(3));
        assert_eq!(parameters.len(), 2);
    }

    #[test]
    fn test_contains_ignores_empty_text() {
        let parameters = DeviceParameters::new()
            .with("empty", "")
            .with("flag", false);

        assert!(!parameters.contains("empty"));
        assert!(parameters.contains("flag"));
        assert!(!parameters.contains("missing"));
    }

    #[rstest]
    #[case(ParameterValue::Bool(true), Some(true))]
    #[case(ParameterValue::Int(0), Some(false))]
    #[case(ParameterValue::Text("yes".into()), Some(true))]
    #[case(ParameterValue::Text("off".into()), Some(false))]
    fn test_flag_conversions(#[case] value: ParameterValue, #[case] expected: Option<bool>) {
        let parameters = DeviceParameters::new().with("flag", value);
        assert_eq!(parameters.flag("flag"), expected);
    }

    #[test]
    fn test_require_text() {
        let parameters = DeviceParameters::new()
            .with("name", "printer")
            .with("count", 2u32)
            .with("blank", "");

        assert_eq!(parameters.require_text("name").unwrap(), "printer");
        assert!(matches!(
            parameters.require_text("blank"),
            Err(Error::MissingParameter(_))
        ));
        assert!(matches!(
            parameters.require_text("count"),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            parameters.require_text("missing"),
            Err(Error::MissingParameter(_))
        ));
    }

    #[test]
    fn test_remove_and_merge() {
        let mut parameters = DeviceParameters::new().with("calling_type", "internal");
        let other = DeviceParameters::new().with("plugin_path", "/opt/plugins/printer.so");

        parameters.merge(&other);
        assert_eq!(parameters.len(), 2);

        let removed = parameters.remove("calling_type");
        assert_eq!(removed, Some(ParameterValue::Text("internal".into())));
        assert!(!parameters.contains("calling_type"));
    }

    #[test]
    fn test_extend_entry_skips_empty_values() {
        let mut data = DeviceParameters::new();
        data.extend_entry("firmware", "version", " ");
        assert!(!data.contains("firmware"));

        data.extend_entry("firmware", "version", "2.0");
        assert_eq!(data.text("firmware"), Some("version 2.0"));
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let json = r#"{"model_name":"VKP-80","operator_presence":true,"retries":2}"#;
        let parameters: DeviceParameters = serde_json::from_str(json).unwrap();

        assert_eq!(parameters.text("model_name"), Some("VKP-80"));
        assert_eq!(parameters.flag("operator_presence"), Some(true));
        assert_eq!(parameters.int("retries"), Some(2));
    }

    #[test]
    fn test_display() {
        let parameters = DeviceParameters::new()
            .with("a", 1u32)
            .with("b", true);
        assert_eq!(parameters.to_string(), "a: 1, b: yes");
    }
}
