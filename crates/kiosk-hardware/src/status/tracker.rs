//! The status reconciliation pipeline.
//!
//! Every poll produces a raw set of status codes. [`StatusTracker`] turns it
//! into what the host finally sees:
//!
//! ```text
//!  raw codes ─► clean ─► recover ─► buffer ─► publish ─► StatusSignal
//!                 │         │          │          │
//!            exclusivity  forgive   debounce   diff, history,
//!            and flags    isolated  blinking   excess filter
//!                         errors    errors
//! ```
//!
//! All stages are total functions over a code set: every input, including
//! the empty set, has a defined outcome and nothing here fails.

use super::codes::{StatusCode, StatusSpecifications, error, ok, warning};
use super::collection::{StatusCodes, StatusCollection, describe_codes};
use super::history::HistoryList;
use crate::types::DeviceFlags;
use kiosk_core::{ExtendedStatus, WarningLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Status payload delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSignal {
    /// Worst severity present.
    pub level: WarningLevel,
    /// Translated messages of the codes at that severity.
    pub message: String,
    pub extended: ExtendedStatus,
}

/// Code sets steering recovery and buffering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Errors forgiven when they recur in isolation.
    pub recoverable: StatusCodes,
    /// Transitional codes during which no error is forgiven.
    pub unsafe_codes: StatusCodes,
    /// Codes the status buffer may mask.
    pub replaceable: StatusCodes,
    /// Codes never reported to the host.
    pub excess: StatusCodes,
    /// Consecutive bad answers masked by the buffer (0 disables it).
    pub max_bad_answers: u32,
    /// Buffer even while an operator is present.
    pub force_status_buffer: bool,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            recoverable: [error::INITIALIZATION].into(),
            unsafe_codes: [
                ok::BUSY,
                ok::INITIALIZATION,
                warning::THIRD_PARTY_DRIVER,
                warning::DEVELOPING,
                warning::OPERATION_ERROR,
                warning::UNKNOWN_DATA_EXCHANGE,
            ]
            .into(),
            replaceable: [error::NOT_AVAILABLE, error::UNKNOWN].into(),
            excess: StatusCodes::new(),
            max_bad_answers: 0,
            force_status_buffer: false,
        }
    }
}

/// Device conditions consulted while cleaning codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanContext {
    /// The last initialization failed.
    pub initialization_failed: bool,
    pub operator_presence: bool,
    /// Plugin and host versions differ.
    pub plugin_mismatch: bool,
}

/// Result of publishing one code set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub new: StatusCollection,
    pub old: StatusCollection,
    /// The collection differs from the previous one, or the environment changed.
    pub changed: bool,
    /// Signal to emit, if the host must be told.
    pub signal: Option<StatusSignal>,
}

/// Status state of one device.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    specifications: StatusSpecifications,
    policy: StatusPolicy,
    collection: StatusCollection,
    history: HistoryList<StatusCollection>,
    bad_answer_counter: u32,
    last_warning_level: Option<WarningLevel>,
}

impl StatusTracker {
    pub fn new(
        specifications: StatusSpecifications,
        policy: StatusPolicy,
        history_size: usize,
    ) -> Self {
        Self {
            specifications,
            policy,
            collection: StatusCollection::new(),
            history: HistoryList::new(history_size),
            bad_answer_counter: 0,
            last_warning_level: None,
        }
    }

    #[must_use]
    pub fn specifications(&self) -> &StatusSpecifications {
        &self.specifications
    }

    pub fn specifications_mut(&mut self) -> &mut StatusSpecifications {
        &mut self.specifications
    }

    #[must_use]
    pub fn policy(&self) -> &StatusPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut StatusPolicy {
        &mut self.policy
    }

    /// Collection published last.
    #[must_use]
    pub fn collection(&self) -> &StatusCollection {
        &self.collection
    }

    #[must_use]
    pub fn history(&self) -> &HistoryList<StatusCollection> {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryList<StatusCollection> {
        &mut self.history
    }

    #[must_use]
    pub fn bad_answer_counter(&self) -> u32 {
        self.bad_answer_counter
    }

    #[must_use]
    pub fn last_warning_level(&self) -> Option<WarningLevel> {
        self.last_warning_level
    }

    /// Classify codes with this tracker's specifications.
    #[must_use]
    pub fn classify(&self, codes: &StatusCodes) -> StatusCollection {
        StatusCollection::from_codes(codes, &self.specifications)
    }

    /// Forget the published collection, keeping the history.
    pub fn clear_collection(&mut self) {
        self.collection.clear();
    }

    /// Forget the published collection and the last emitted level.
    pub fn reset(&mut self) {
        self.collection.clear();
        self.last_warning_level = None;
    }

    /// The device just regained power, or nothing is known about it yet.
    #[must_use]
    pub fn is_power_reboot(&self) -> bool {
        self.history.is_empty()
            || (self.history.last_value(2).contains_code(error::NOT_AVAILABLE)
                && !self.history.last_value(1).contains_code(error::NOT_AVAILABLE))
    }

    /// The device was unavailable and answers again with these codes.
    #[must_use]
    pub fn is_power_turn_on(&self, codes: &StatusCodes) -> bool {
        !codes.contains(&error::NOT_AVAILABLE) && self.collection.contains_code(error::NOT_AVAILABLE)
    }

    /// A failed initialization that a power cycle does not explain.
    #[must_use]
    pub fn is_initialization_error(&self, codes: &StatusCodes, initialization_failed: bool) -> bool {
        initialization_failed && !self.is_power_turn_on(codes)
    }

    /// Apply the cleanup rule chain.
    ///
    /// Exclusive codes (`Error::NOT_AVAILABLE`, `Error::THIRD_PARTY_DRIVER_FAIL`)
    /// always come out alone; generic codes give way to specific ones.
    pub fn clean_status_codes(
        &self,
        codes: &mut StatusCodes,
        flags: &mut DeviceFlags,
        context: &CleanContext,
    ) {
        if self.is_initialization_error(codes, context.initialization_failed)
            || flags.initialization_error
        {
            codes.insert(error::INITIALIZATION);
        }

        if codes.contains(&error::INITIALIZATION) {
            codes.remove(&ok::INITIALIZATION);
            codes.remove(&ok::BUSY);
        }

        if codes.contains(&error::NOT_AVAILABLE) {
            keep_only(codes, error::NOT_AVAILABLE);
            flags.need_reboot = false;
            flags.initialization_error = false;
        }

        if codes.contains(&error::THIRD_PARTY_DRIVER_FAIL) {
            keep_only(codes, error::THIRD_PARTY_DRIVER_FAIL);
        }

        let exclusive = codes.contains(&error::NOT_AVAILABLE)
            || codes.contains(&error::THIRD_PARTY_DRIVER_FAIL);
        if !exclusive {
            if flags.old_firmware {
                codes.insert(warning::FIRMWARE);
            }
            if flags.need_reboot {
                codes.insert(warning::NEED_REBOOT);
            }
            if !flags.verified {
                codes.insert(warning::MODEL_NOT_VERIFIED);
            }
            if !flags.model_compatibility {
                codes.insert(warning::MODEL_NOT_COMPATIBLE);
            }
            if !context.operator_presence && context.plugin_mismatch {
                codes.insert(warning::COMPATIBILITY);
            }
        }

        if codes.len() > 1 {
            codes.remove(&ok::OK);
        }

        let collection = self.classify(codes);

        if collection.size(WarningLevel::Ok) > 1 {
            codes.remove(&ok::UNKNOWN);
        }

        if codes.len() > 1 {
            codes.remove(&warning::OPERATION_ERROR);
        }

        if collection.size(WarningLevel::Error) > 1 {
            codes.remove(&error::UNKNOWN);
        }
    }

    /// Forgive recoverable errors that recur without any other error.
    ///
    /// While the last initialization has failed, the initialization error
    /// is never forgiven: it stays until an initialization succeeds.
    /// Never leaves the set empty: `OK::OK` stands for "nothing wrong".
    pub fn recover_errors(&self, codes: &mut StatusCodes, initialization_failed: bool) {
        let recoverable = |code: &StatusCode| {
            self.policy.recoverable.contains(code)
                && !(initialization_failed && *code == error::INITIALIZATION)
        };
        let unsafe_present = codes.iter().any(|code| self.policy.unsafe_codes.contains(code));
        let recoverable_present = codes.iter().any(&recoverable);

        if !unsafe_present
            && self.collection.contains_level(WarningLevel::Error)
            && recoverable_present
        {
            let is_other_error = |code: &StatusCode| {
                !recoverable(code) && self.specifications.level(*code).is_error()
            };
            let new_other_errors = codes.iter().any(is_other_error);
            let old_other_errors = self
                .collection
                .bucket(WarningLevel::Error)
                .iter()
                .any(is_other_error);

            if !new_other_errors && !old_other_errors {
                let forgiven: StatusCodes = codes
                    .iter()
                    .filter(|code| {
                        recoverable(*code) && self.specifications.level(**code).is_error()
                    })
                    .copied()
                    .collect();

                if !forgiven.is_empty() {
                    debug!(
                        "Recoverable errors forgiven: {}",
                        describe_codes(&forgiven, &self.specifications)
                    );
                }
                codes.retain(|code| !forgiven.contains(code));
            }
        }

        if codes.is_empty() {
            codes.insert(ok::OK);
        }
    }

    /// Whether the buffer may mask anything right now.
    #[must_use]
    pub fn can_apply_status_buffer(&self, operator_presence: bool, post_polling_action: bool) -> bool {
        self.policy.max_bad_answers > 0
            && (self.policy.force_status_buffer || (!operator_presence && post_polling_action))
            && !self.collection.is_empty()
            && !self.collection.contains_code(error::NOT_AVAILABLE)
    }

    /// The codes carry a replaceable status the device does not already report.
    #[must_use]
    pub fn is_statuses_replaceable(&self, codes: &StatusCodes) -> bool {
        let errors = self.collection.bucket(WarningLevel::Error);
        self.policy
            .replaceable
            .iter()
            .any(|code| codes.contains(code) && !errors.contains(code))
    }

    /// Debounce blinking errors.
    ///
    /// While fewer than `max_bad_answers + 1` consecutive bad answers were
    /// seen, the previous codes replace the incoming ones. Returns `true`
    /// when a substitution happened.
    pub fn apply_status_buffer(
        &mut self,
        codes: &mut StatusCodes,
        operator_presence: bool,
        post_polling_action: bool,
    ) -> bool {
        if !(self.can_apply_status_buffer(operator_presence, post_polling_action)
            && self.is_statuses_replaceable(codes))
        {
            self.bad_answer_counter = 0;
            return false;
        }

        let max = self.policy.max_bad_answers;
        if self.bad_answer_counter <= max {
            self.bad_answer_counter += 1;
        }
        if self.bad_answer_counter > max {
            return false;
        }

        *codes = self.collection.codes();
        warn!(
            "Bad answer counter = {} of {}, return previous statuses: {}",
            self.bad_answer_counter,
            max,
            describe_codes(codes.iter(), &self.specifications)
        );
        true
    }

    /// Store the new collection and decide what the host must see.
    pub fn publish(&mut self, codes: &StatusCodes, environment_changed: bool) -> Publication {
        let new = self.classify(codes);
        let changed = new != self.collection || environment_changed;

        if changed {
            self.log_changes(&new);

            if self.history.last_value(1) != new {
                self.history.append(new.clone());
            }
            debug!("Status history: {}", self.history_summary());
        }

        let old = std::mem::replace(&mut self.collection, new.clone());
        let signal = self.send_statuses(&new, &old, environment_changed);

        Publication {
            new,
            old,
            changed,
            signal,
        }
    }

    /// Emission decision for a published collection.
    ///
    /// The warning level is taken before excess codes are filtered out; an
    /// empty filtered collection reads as `OK::OK`.
    pub fn send_statuses(
        &mut self,
        new: &StatusCollection,
        old: &StatusCollection,
        environment_changed: bool,
    ) -> Option<StatusSignal> {
        let warning_level = new.warning_level();
        let excess = self.classify(&self.policy.excess);

        let mut new_filtered = new.difference(&excess);
        let mut old_filtered = old.difference(&excess);
        if new_filtered.is_empty() {
            new_filtered.insert(WarningLevel::Ok, ok::OK);
        }
        if old_filtered.is_empty() && !old.is_empty() {
            old_filtered.insert(WarningLevel::Ok, ok::OK);
        }

        let emit = environment_changed
            || (new_filtered != old_filtered && new != old)
            || self.last_warning_level != Some(warning_level);

        emit.then(|| self.signal_for(&new_filtered, ExtendedStatus::Actual))
    }

    /// Build a signal for one code, e.g. "initialization in progress".
    pub fn signal_for_code(&mut self, code: StatusCode, extended: ExtendedStatus) -> StatusSignal {
        let collection = self.classify(&[code].into());
        self.signal_for(&collection, extended)
    }

    fn signal_for(&mut self, collection: &StatusCollection, extended: ExtendedStatus) -> StatusSignal {
        let level = collection.warning_level();
        if extended.updates_warning_level() {
            self.last_warning_level = Some(level);
        }

        StatusSignal {
            level,
            message: collection.translate(&self.specifications),
            extended,
        }
    }

    fn log_changes(&self, new: &StatusCollection) {
        for level in WarningLevel::ALL {
            let added: StatusCodes = new
                .bucket(level)
                .difference(self.collection.bucket(level))
                .copied()
                .collect();
            let removed: StatusCodes = self
                .collection
                .bucket(level)
                .difference(new.bucket(level))
                .copied()
                .collect();

            if !added.is_empty() {
                info!(
                    "{level} statuses added: {}",
                    describe_codes(&added, &self.specifications)
                );
            }
            if !removed.is_empty() {
                info!(
                    "{level} statuses removed: {}",
                    describe_codes(&removed, &self.specifications)
                );
            }
        }
    }

    fn history_summary(&self) -> String {
        self.history
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(
            StatusSpecifications::default(),
            StatusPolicy::default(),
            kiosk_core::constants::DEFAULT_HISTORY_SIZE,
        )
    }
}

fn keep_only(codes: &mut StatusCodes, code: StatusCode) {
    if codes.len() > 1 {
        codes.clear();
        codes.insert(code);
    }
}
