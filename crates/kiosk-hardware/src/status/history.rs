//! Bounded status history with a processed-level cursor.
//!
//! The history keeps the most recent snapshots, evicting the oldest first.
//! Next to the entries it tracks how many of them (counted from the oldest)
//! have already been acted upon. Consumers mark everything processed with
//! [`save_level`](HistoryList::save_level), and can hand the newest entry
//! back with [`check_last_unprocessed`](HistoryList::check_last_unprocessed)
//! when acting on it failed.
//!
//! ```text
//!  oldest                         newest
//!  ┌─────┬─────┬─────┬─────┬─────┐
//!  │  0  │  1  │  2  │  3  │  4  │   len = 5
//!  └─────┴─────┴─────┴─────┴─────┘
//!  ◄──── processed ────►            level = 3
//! ```

use std::collections::VecDeque;

/// Bounded FIFO of snapshots.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::status::HistoryList;
///
/// let mut history = HistoryList::new(2);
/// history.append(1);
/// history.append(2);
/// history.append(3);
///
/// assert_eq!(history.len(), 2);
/// assert_eq!(history.last_value(1), 3);
/// assert_eq!(history.last_value(2), 2);
/// assert_eq!(history.last_value(3), 0); // beyond the history: default value
/// ```
#[derive(Debug, Clone)]
pub struct HistoryList<T> {
    entries: VecDeque<T>,
    capacity: usize,
    level: usize,
}

impl<T> HistoryList<T> {
    /// Create a history holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            level: 0,
        }
    }

    /// Append a snapshot, evicting the oldest ones beyond the capacity.
    pub fn append(&mut self, value: T) {
        self.entries.push_back(value);
        self.evict();
    }

    /// Change the capacity, evicting the oldest entries if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            // The evicted entry was the oldest, so it was processed if any was.
            self.level = self.level.saturating_sub(1);
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `levels_back` positions from the end (1 is the newest).
    #[must_use]
    pub fn get_back(&self, levels_back: usize) -> Option<&T> {
        if levels_back == 0 || levels_back > self.entries.len() {
            return None;
        }
        self.entries.get(self.entries.len() - levels_back)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    /// Number of entries already processed, counted from the oldest.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Mark every entry as processed.
    pub fn save_level(&mut self) {
        self.level = self.entries.len();
    }

    /// Clamp the processed level to the current length.
    pub fn update_level(&mut self) {
        self.level = self.level.min(self.entries.len());
    }

    /// Mark the newest entry as not processed.
    pub fn check_last_unprocessed(&mut self) {
        self.level = self.level.min(self.entries.len().saturating_sub(1));
    }

    /// Entries not processed yet, oldest first.
    pub fn unprocessed(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().skip(self.level)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.level = 0;
    }
}

impl<T: Clone + Default> HistoryList<T> {
    /// Snapshot `levels_back` positions from the end, or a default value.
    ///
    /// Never fails: an empty history or an out-of-range request means
    /// "no prior data".
    #[must_use]
    pub fn last_value(&self, levels_back: usize) -> T {
        self.get_back(levels_back).cloned().unwrap_or_default()
    }
}

impl<T> Default for HistoryList<T> {
    fn default() -> Self {
        Self::new(kiosk_core::constants::DEFAULT_HISTORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_evicts_oldest() {
        let mut history = HistoryList::new(3);
        for value in 1..=5 {
            history.append(value);
        }

        let values: Vec<i32> = history.iter().copied().collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_last_value_degrades_to_default() {
        let mut history: HistoryList<Vec<u8>> = HistoryList::new(4);
        assert!(history.last_value(1).is_empty());

        history.append(vec![1]);
        assert_eq!(history.last_value(1), vec![1]);
        assert!(history.last_value(0).is_empty());
        assert!(history.last_value(2).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = HistoryList::new(0);
        history.append(1);
        history.append(2);

        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_value(1), 2);
    }

    #[test]
    fn test_level_follows_evictions() {
        let mut history = HistoryList::new(3);
        history.append(1);
        history.append(2);
        history.save_level();
        assert_eq!(history.level(), 2);

        history.append(3);
        assert_eq!(history.level(), 2);
        assert_eq!(history.unprocessed().copied().collect::<Vec<_>>(), vec![3]);

        history.append(4);
        assert_eq!(history.level(), 1);
        assert_eq!(history.unprocessed().copied().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_level_stays_zero_when_nothing_processed() {
        let mut history = HistoryList::new(2);
        for value in 0..5 {
            history.append(value);
        }
        assert_eq!(history.level(), 0);
    }

    #[test]
    fn test_check_last_unprocessed() {
        let mut history = HistoryList::new(5);
        history.append('a');
        history.append('b');
        history.save_level();

        history.check_last_unprocessed();
        assert_eq!(history.level(), 1);
        assert_eq!(history.unprocessed().copied().collect::<Vec<_>>(), vec!['b']);

        // Already unprocessed: stays where it is.
        history.check_last_unprocessed();
        assert_eq!(history.level(), 1);
    }

    #[test]
    fn test_check_last_unprocessed_on_empty_history() {
        let mut history: HistoryList<u8> = HistoryList::new(5);
        history.check_last_unprocessed();
        assert_eq!(history.level(), 0);
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let mut history = HistoryList::new(5);
        for value in 0..5 {
            history.append(value);
        }
        history.save_level();

        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.level(), 2);
        assert_eq!(history.last_value(2), 3);
    }

    #[test]
    fn test_update_level_and_clear() {
        let mut history = HistoryList::new(3);
        history.append(1);
        history.save_level();
        history.update_level();
        assert_eq!(history.level(), 1);

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.level(), 0);
    }
}
