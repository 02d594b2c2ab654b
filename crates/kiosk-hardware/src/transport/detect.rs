//! Auto-detection support: USB identity tables and the detecting cursor.

use super::port::EndpointInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a driver knows about one USB product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductData {
    pub model: String,
    /// The model was tested with the driver.
    pub verified: bool,
}

/// Products a driver recognizes, keyed by vendor id then product id.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::transport::{DetectingData, EndpointInfo};
///
/// let mut data = DetectingData::new();
/// data.add(0x04b8, 0x0e15, "Epson TM-T20", true);
///
/// let endpoint = EndpointInfo::new("1:7").with_usb_ids(0x04b8, 0x0e15);
/// assert_eq!(data.product_for(&endpoint).unwrap().model, "Epson TM-T20");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectingData(BTreeMap<u16, BTreeMap<u16, ProductData>>);

impl DetectingData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, vendor_id: u16, product_id: u16, model: impl Into<String>, verified: bool) {
        self.0.entry(vendor_id).or_default().insert(
            product_id,
            ProductData {
                model: model.into(),
                verified,
            },
        );
    }

    #[must_use]
    pub fn get(&self, vendor_id: u16, product_id: u16) -> Option<&ProductData> {
        self.0.get(&vendor_id)?.get(&product_id)
    }

    /// Product matching an enumerated endpoint's USB identity.
    #[must_use]
    pub fn product_for(&self, endpoint: &EndpointInfo) -> Option<&ProductData> {
        self.get(endpoint.vendor_id?, endpoint.product_id?)
    }

    #[must_use]
    pub fn matches(&self, endpoint: &EndpointInfo) -> bool {
        self.product_for(endpoint).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of known products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

/// Position in a list of detection candidates.
///
/// Starts before the first candidate; each [`move_next`](Self::move_next)
/// steps forward until the list is exhausted.
#[derive(Debug, Clone)]
pub struct DetectingCursor<T> {
    candidates: Vec<T>,
    position: Option<usize>,
}

impl<T> DetectingCursor<T> {
    pub fn new(candidates: Vec<T>) -> Self {
        Self {
            candidates,
            position: None,
        }
    }

    /// Step to the next candidate.
    pub fn move_next(&mut self) -> Option<&T> {
        let next = self.position.map_or(0, |position| position + 1);
        if next >= self.candidates.len() {
            self.position = Some(self.candidates.len());
            return None;
        }
        self.position = Some(next);
        self.candidates.get(next)
    }

    #[must_use]
    pub fn current(&self) -> Option<&T> {
        self.candidates.get(self.position?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detecting_data_lookup() {
        let mut data = DetectingData::new();
        data.add(0x0dd4, 0x0015, "Custom VKP80", false);
        data.add(0x0dd4, 0x0205, "Custom TG2480", true);

        assert_eq!(data.len(), 2);
        assert!(!data.get(0x0dd4, 0x0015).unwrap().verified);
        assert!(data.get(0x0dd4, 0x9999).is_none());
        assert!(data.get(0x1111, 0x0015).is_none());
    }

    #[test]
    fn test_endpoint_without_usb_ids_never_matches() {
        let mut data = DetectingData::new();
        data.add(0x0dd4, 0x0015, "Custom VKP80", true);

        assert!(!data.matches(&EndpointInfo::new("COM1")));
        assert!(data.matches(&EndpointInfo::new("2:3").with_usb_ids(0x0dd4, 0x0015)));
    }

    #[test]
    fn test_detecting_data_deserialization() {
        let json = r#"{"1208": {"3605": {"model": "Epson TM-T20", "verified": true}}}"#;
        let data: DetectingData = serde_json::from_str(json).unwrap();

        assert_eq!(data.get(0x04b8, 0x0e15).unwrap().model, "Epson TM-T20");
    }

    #[test]
    fn test_cursor_walks_candidates() {
        let mut cursor = DetectingCursor::new(vec!["COM1", "COM2"]);
        assert!(cursor.current().is_none());

        assert_eq!(cursor.move_next(), Some(&"COM1"));
        assert_eq!(cursor.current(), Some(&"COM1"));
        assert_eq!(cursor.move_next(), Some(&"COM2"));
        assert_eq!(cursor.move_next(), None);
        assert!(cursor.current().is_none());
        assert_eq!(cursor.move_next(), None);
    }

    #[test]
    fn test_empty_cursor() {
        let mut cursor: DetectingCursor<u8> = DetectingCursor::new(Vec::new());
        assert!(cursor.is_empty());
        assert_eq!(cursor.move_next(), None);
    }
}
