//! Severity-leveled status collections.

use super::codes::{StatusCode, StatusSpecifications};
use kiosk_core::WarningLevel;
use kiosk_core::constants::STATUS_MESSAGE_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of status codes.
///
/// Ordered so that logs and translated messages come out the same way
/// every time; uniqueness is the only semantic invariant.
pub type StatusCodes = BTreeSet<StatusCode>;

/// Status codes split into OK, Warning and Error buckets.
///
/// A code lives in exactly one bucket, chosen by its specification. Empty
/// buckets compare equal to missing ones, so two collections are equal
/// whenever they hold the same codes.
///
/// # Examples
///
/// ```
/// use kiosk_core::WarningLevel;
/// use kiosk_hardware::status::{StatusCodes, StatusCollection, StatusSpecifications, codes};
///
/// let specifications = StatusSpecifications::default();
/// let raw: StatusCodes = [codes::warning::FIRMWARE, codes::error::COVER_IS_OPENED].into();
/// let collection = StatusCollection::from_codes(&raw, &specifications);
///
/// assert_eq!(collection.size(WarningLevel::Error), 1);
/// assert_eq!(collection.warning_level(), WarningLevel::Error);
/// assert!(collection.contains_code(codes::warning::FIRMWARE));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCollection {
    ok: StatusCodes,
    warning: StatusCodes,
    error: StatusCodes,
}

impl StatusCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every code into its severity bucket.
    #[must_use]
    pub fn from_codes<'a>(
        codes: impl IntoIterator<Item = &'a StatusCode>,
        specifications: &StatusSpecifications,
    ) -> Self {
        let mut collection = Self::new();
        collection.union(codes, specifications);
        collection
    }

    /// Add codes, each to the bucket of its severity.
    pub fn union<'a>(
        &mut self,
        codes: impl IntoIterator<Item = &'a StatusCode>,
        specifications: &StatusSpecifications,
    ) {
        for &code in codes {
            self.insert(specifications.level(code), code);
        }
    }

    /// Add a code to an explicit bucket.
    pub fn insert(&mut self, level: WarningLevel, code: StatusCode) {
        self.bucket_mut(level).insert(code);
    }

    #[must_use]
    pub fn bucket(&self, level: WarningLevel) -> &StatusCodes {
        match level {
            WarningLevel::Ok => &self.ok,
            WarningLevel::Warning => &self.warning,
            WarningLevel::Error => &self.error,
        }
    }

    pub fn bucket_mut(&mut self, level: WarningLevel) -> &mut StatusCodes {
        match level {
            WarningLevel::Ok => &mut self.ok,
            WarningLevel::Warning => &mut self.warning,
            WarningLevel::Error => &mut self.error,
        }
    }

    /// Copy of this collection with `other`'s codes removed per bucket.
    #[must_use]
    pub fn difference(&self, other: &StatusCollection) -> StatusCollection {
        let mut result = StatusCollection::new();
        for level in WarningLevel::ALL {
            *result.bucket_mut(level) = self
                .bucket(level)
                .difference(other.bucket(level))
                .copied()
                .collect();
        }
        result
    }

    /// Number of codes in one bucket.
    #[must_use]
    pub fn size(&self, level: WarningLevel) -> usize {
        self.bucket(level).len()
    }

    #[must_use]
    pub fn is_empty_level(&self, level: WarningLevel) -> bool {
        self.bucket(level).is_empty()
    }

    /// Returns `true` if any code of this severity is present.
    #[must_use]
    pub fn contains_level(&self, level: WarningLevel) -> bool {
        !self.is_empty_level(level)
    }

    /// Returns `true` if any bucket holds the code.
    #[must_use]
    pub fn contains_code(&self, code: StatusCode) -> bool {
        WarningLevel::ALL
            .iter()
            .any(|&level| self.bucket(level).contains(&code))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        WarningLevel::ALL.iter().all(|&level| self.is_empty_level(level))
    }

    /// All codes regardless of severity.
    #[must_use]
    pub fn codes(&self) -> StatusCodes {
        self.ok
            .iter()
            .chain(&self.warning)
            .chain(&self.error)
            .copied()
            .collect()
    }

    /// Highest severity present; OK for an empty collection.
    #[must_use]
    pub fn warning_level(&self) -> WarningLevel {
        WarningLevel::ALL
            .into_iter()
            .rev()
            .find(|&level| self.contains_level(level))
            .unwrap_or(WarningLevel::Ok)
    }

    pub fn clear(&mut self) {
        self.ok.clear();
        self.warning.clear();
        self.error.clear();
    }

    /// Translated messages of the codes at the worst present severity.
    #[must_use]
    pub fn translate(&self, specifications: &StatusSpecifications) -> String {
        translate_codes(self.bucket(self.warning_level()), specifications)
    }
}

/// Join the sorted translations of codes into one message.
#[must_use]
pub fn translate_codes<'a>(
    codes: impl IntoIterator<Item = &'a StatusCode>,
    specifications: &StatusSpecifications,
) -> String {
    let mut translations: Vec<&str> = codes
        .into_iter()
        .map(|&code| specifications.translation(code))
        .collect();
    translations.sort_unstable();
    translations.dedup();
    translations.join(STATUS_MESSAGE_SEPARATOR)
}

/// Join the technical descriptions of codes, for logs.
#[must_use]
pub fn describe_codes<'a>(
    codes: impl IntoIterator<Item = &'a StatusCode>,
    specifications: &StatusSpecifications,
) -> String {
    codes
        .into_iter()
        .map(|&code| specifications.description(code))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for StatusCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for level in WarningLevel::ALL {
            let bucket = self.bucket(level);
            if bucket.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            let codes: Vec<String> = bucket.iter().map(ToString::to_string).collect();
            write!(f, "{level}: {{{}}}", codes.join(", "))?;
            first = false;
        }
        if first {
            f.write_str("empty")?;
        }
        Ok(())
    }
}
