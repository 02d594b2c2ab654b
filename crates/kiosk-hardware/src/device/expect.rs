//! Poll-until-condition waiting.

use kiosk_core::constants::{DEFAULT_RELEASE_TIMEOUT_MS, DEFAULT_WAIT_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// How to wait for a device condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Pause between checks.
    pub interval: Duration,
    /// Overall budget.
    pub timeout: Duration,
    /// A failed poll ends the wait.
    pub poll_sensible: bool,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_WAIT_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_RELEASE_TIMEOUT_MS),
            poll_sensible: false,
        }
    }
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            poll_sensible: false,
        }
    }

    #[must_use]
    pub fn with_poll_sensible(mut self, poll_sensible: bool) -> Self {
        self.poll_sensible = poll_sensible;
        self
    }
}

/// Blocking waiter over some state `S`.
///
/// Runs on the device worker: the worker is busy for the whole wait, which
/// keeps polls and commands from interleaving with it.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::device::{PollingExpector, WaitPolicy};
/// use std::time::Duration;
///
/// let policy = WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(500));
/// let mut polls = 0;
///
/// let ready = PollingExpector::new(policy).wait(
///     &mut polls,
///     |polls| {
///         *polls += 1;
///         true
///     },
///     |polls| *polls >= 3,
///     |_| false,
/// );
///
/// assert!(ready);
/// assert_eq!(polls, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingExpector {
    policy: WaitPolicy,
}

impl PollingExpector {
    #[must_use]
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Wait until `condition` holds.
    ///
    /// Checks once before polling, polls once, then keeps polling every
    /// interval. Returns `false` when `error_condition` holds, when the
    /// timeout elapses, or when a poll fails under a poll-sensible policy.
    pub fn wait<S: ?Sized>(
        &self,
        state: &mut S,
        mut on_poll: impl FnMut(&mut S) -> bool,
        mut condition: impl FnMut(&S) -> bool,
        mut error_condition: impl FnMut(&S) -> bool,
    ) -> bool {
        if condition(state) {
            return true;
        }

        let started = Instant::now();
        loop {
            if !on_poll(state) && self.policy.poll_sensible {
                debug!("Wait aborted: poll failed");
                return false;
            }
            if condition(state) {
                return true;
            }
            if error_condition(state) {
                debug!("Wait aborted: error condition");
                return false;
            }
            if started.elapsed() >= self.policy.timeout {
                debug!("Wait timed out after {:?}", self.policy.timeout);
                return false;
            }

            std::thread::sleep(self.policy.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[test]
    fn test_condition_already_true_skips_poll() {
        let mut polls = 0u32;
        let ready = PollingExpector::new(quick()).wait(
            &mut polls,
            |polls| {
                *polls += 1;
                true
            },
            |_| true,
            |_| false,
        );

        assert!(ready);
        assert_eq!(polls, 0);
    }

    #[test]
    fn test_timeout() {
        let mut polls = 0u32;
        let ready = PollingExpector::new(quick()).wait(
            &mut polls,
            |polls| {
                *polls += 1;
                true
            },
            |_| false,
            |_| false,
        );

        assert!(!ready);
        assert!(polls >= 2);
    }

    #[test]
    fn test_error_condition_stops_wait() {
        let mut polls = 0u32;
        let ready = PollingExpector::new(quick()).wait(
            &mut polls,
            |polls| {
                *polls += 1;
                true
            },
            |_| false,
            |polls| *polls == 2,
        );

        assert!(!ready);
        assert_eq!(polls, 2);
    }

    #[test]
    fn test_failed_poll_only_matters_when_sensible() {
        let mut polls = 0u32;
        let failing = |polls: &mut u32| {
            *polls += 1;
            false
        };

        let sensible = quick().with_poll_sensible(true);
        assert!(!PollingExpector::new(sensible).wait(&mut polls, failing, |_| false, |_| false));
        assert_eq!(polls, 1);

        polls = 0;
        let ready = PollingExpector::new(quick()).wait(&mut polls, failing, |polls| *polls == 3, |_| false);
        assert!(ready);
    }
}
