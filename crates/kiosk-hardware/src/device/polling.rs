//! Periodic polling.
//!
//! The policy only tracks whether polling is active, at which interval,
//! and which one-shot tasks wait for the next successful poll. The timer
//! itself is created lazily on the device worker the first time it is
//! awaited, so a policy can be built and configured outside a runtime.

use super::driver::DriverTask;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Polling state of one device.
pub struct PollingPolicy {
    interval: Duration,
    active: bool,
    wait_first: bool,
    timer: Option<Interval>,
    tasks: VecDeque<DriverTask>,
}

impl fmt::Debug for PollingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingPolicy")
            .field("interval", &self.interval)
            .field("active", &self.active)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl PollingPolicy {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        assert!(!interval.is_zero(), "polling interval must be positive");
        Self {
            interval,
            active: false,
            wait_first: true,
            timer: None,
            tasks: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether polling was started, independent of the timer's state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start polling. With `not_wait_first` the first tick fires at once.
    pub fn start_polling(&mut self, not_wait_first: bool) {
        if self.active {
            return;
        }
        debug!("Polling started, interval {:?}", self.interval);
        self.active = true;
        self.wait_first = !not_wait_first;
        self.timer = None;
    }

    pub fn stop_polling(&mut self) {
        if self.active {
            debug!("Polling stopped");
        }
        self.active = false;
        self.timer = None;
    }

    /// Change the interval, restarting an active timer. Returns whether
    /// the interval changed.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn set_polling_interval(&mut self, interval: Duration) -> bool {
        assert!(!interval.is_zero(), "polling interval must be positive");
        if interval == self.interval {
            return false;
        }

        debug!("Polling interval {:?} -> {interval:?}", self.interval);
        self.interval = interval;
        if self.active {
            self.wait_first = true;
            self.timer = None;
        }
        true
    }

    /// Wait for the next polling tick; never completes while inactive.
    pub async fn tick(&mut self) {
        if !self.active {
            return std::future::pending().await;
        }

        let interval = self.interval;
        let wait_first = self.wait_first;
        let timer = self.timer.get_or_insert_with(|| {
            let start = if wait_first {
                Instant::now() + interval
            } else {
                Instant::now()
            };
            let mut timer = tokio::time::interval_at(start, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        timer.tick().await;
    }

    /// Queue a one-shot task for the next poll that finds the device connected.
    pub fn enqueue_post_poll_task(&mut self, task: DriverTask) {
        self.tasks.push_back(task);
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Take every queued task, oldest first.
    pub fn take_post_poll_tasks(&mut self) -> VecDeque<DriverTask> {
        std::mem::take(&mut self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_stop() {
        let mut policy = PollingPolicy::new(Duration::from_millis(100));
        assert!(!policy.is_active());

        policy.start_polling(false);
        assert!(policy.is_active());

        policy.stop_polling();
        assert!(!policy.is_active());
    }

    #[test]
    #[should_panic(expected = "polling interval must be positive")]
    fn test_zero_interval_panics() {
        let _ = PollingPolicy::new(Duration::ZERO);
    }

    #[test]
    fn test_set_same_interval_is_noop() {
        let mut policy = PollingPolicy::new(Duration::from_millis(100));
        assert!(!policy.set_polling_interval(Duration::from_millis(100)));
        assert!(policy.set_polling_interval(Duration::from_millis(250)));
        assert_eq!(policy.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_tasks_are_fifo_and_taken_once() {
        let mut policy = PollingPolicy::new(Duration::from_millis(100));
        policy.enqueue_post_poll_task(Box::new(|_, _| {}));
        policy.enqueue_post_poll_task(Box::new(|_, _| {}));
        assert_eq!(policy.pending_tasks(), 2);

        let tasks = policy.take_post_poll_tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(policy.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_not_wait_first_fires_immediately() {
        let mut policy = PollingPolicy::new(Duration::from_secs(10));
        policy.start_polling(true);

        let started = Instant::now();
        policy.tick().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        policy.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_waits_first_interval() {
        let mut policy = PollingPolicy::new(Duration::from_secs(5));
        policy.start_polling(false);

        let started = Instant::now();
        policy.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_tick_never_completes() {
        let mut policy = PollingPolicy::new(Duration::from_millis(10));
        let result = tokio::time::timeout(Duration::from_secs(60), policy.tick()).await;
        assert!(result.is_err());
    }
}
