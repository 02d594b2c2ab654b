//! Bit-mapped decoding of raw status answers.
//!
//! Many devices answer a status request with one or more bytes where each
//! bit flags a condition. A [`BitmapCodeSpecification`] maps bit positions
//! to status codes; some bits are active-low and are registered inverted.

use super::codes::{StatusCode, error};
use super::collection::StatusCodes;
use std::collections::{BTreeMap, BTreeSet};

/// Mapping from answer bits to status codes.
///
/// Bit positions count from the least significant bit of the first byte:
/// bit 9 is bit 1 of the second byte.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::status::{BitmapCodeSpecification, StatusCodes, codes};
///
/// let mut specification = BitmapCodeSpecification::new();
/// specification.add_status(0, 5, codes::error::COVER_IS_OPENED, "cover is opened");
/// specification.add_inverted_status(1, 0, codes::error::POWER_SUPPLY, "no power");
///
/// let mut found = StatusCodes::new();
/// specification.decode(&[0b0010_0000, 0b0000_0001], &mut found);
/// assert_eq!(found, StatusCodes::from([codes::error::COVER_IS_OPENED]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BitmapCodeSpecification {
    bits: BTreeMap<usize, (StatusCode, String)>,
    inverted: BTreeSet<usize>,
}

impl BitmapCodeSpecification {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map bit `bit` of byte `byte` to a code, active when the bit is set.
    pub fn add_status(&mut self, byte: usize, bit: usize, code: StatusCode, description: &str) {
        self.bits
            .insert(byte * 8 + bit, (code, description.to_string()));
    }

    /// Map bit `bit` of byte `byte` to a code, active when the bit is clear.
    pub fn add_inverted_status(
        &mut self,
        byte: usize,
        bit: usize,
        code: StatusCode,
        description: &str,
    ) {
        self.add_status(byte, bit, code, description);
        self.inverted.insert(byte * 8 + bit);
    }

    /// Decode an answer into status codes.
    ///
    /// A mapped bit beyond the end of the answer adds `Error::UNKNOWN`:
    /// the answer is too short to be trusted.
    pub fn decode(&self, answer: &[u8], codes: &mut StatusCodes) {
        for (&position, &(code, _)) in &self.bits {
            let Some(byte) = answer.get(position / 8) else {
                codes.insert(error::UNKNOWN);
                continue;
            };

            let set = (byte >> (position % 8)) & 1 == 1;
            if set != self.inverted.contains(&position) {
                codes.insert(code);
            }
        }
    }

    /// Descriptions of the active bits, for logging.
    #[must_use]
    pub fn describe(&self, answer: &[u8]) -> Vec<&str> {
        self.bits
            .iter()
            .filter(|&(&position, _)| {
                answer.get(position / 8).is_some_and(|byte| {
                    ((byte >> (position % 8)) & 1 == 1) != self.inverted.contains(&position)
                })
            })
            .map(|(_, (_, description))| description.as_str())
            .collect()
    }
}
