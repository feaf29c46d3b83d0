//! Sliding window of per-poll averages.

use std::collections::VecDeque;
use std::time::Duration;

/// Tolerance for float division when sizing the window, so that
/// `3s / 10ms` yields 300 slots rather than 301.
const CAPACITY_EPSILON: f64 = 1e-9;

/// Number of poll averages that cover `window` at one poll per `poll_interval`.
///
/// Rounds up, and never returns less than one slot.
pub fn capacity_for(window: Duration, poll_interval: Duration) -> usize {
    let poll = poll_interval.as_secs_f64();
    if poll <= 0.0 {
        return 1;
    }
    let slots = (window.as_secs_f64() / poll - CAPACITY_EPSILON).ceil();
    if slots < 1.0 {
        1
    } else {
        slots as usize
    }
}

/// Bounded FIFO of poll averages.
///
/// Pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::new(),
            capacity,
        }
    }

    /// Create a window sized for `window` at one entry per `poll_interval`.
    pub fn for_duration(window: Duration, poll_interval: Duration) -> Self {
        Self::new(capacity_for(window, poll_interval))
    }

    /// Append a poll average, evicting the oldest entry if full.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Mean of all entries, or `None` if the window is empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for_exact_division() {
        assert_eq!(capacity_for(Duration::from_secs(3), Duration::from_millis(10)), 300);
        assert_eq!(capacity_for(Duration::from_millis(300), Duration::from_millis(100)), 3);
    }

    #[test]
    fn test_capacity_for_rounds_up() {
        assert_eq!(capacity_for(Duration::from_millis(250), Duration::from_millis(100)), 3);
    }

    #[test]
    fn test_capacity_for_minimum_one() {
        assert_eq!(capacity_for(Duration::from_millis(5), Duration::from_millis(10)), 1);
        assert_eq!(capacity_for(Duration::ZERO, Duration::from_millis(10)), 1);
        assert_eq!(capacity_for(Duration::from_secs(1), Duration::ZERO), 1);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.len(), window.capacity());
        assert_eq!(window.mean(), Some(3.0));
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        for (window_ms, poll_ms) in [(3000, 10), (250, 100), (100, 100), (1000, 300)] {
            let window = Duration::from_millis(window_ms);
            let poll = Duration::from_millis(poll_ms);
            let bound = (window_ms as f64 / poll_ms as f64).ceil() as usize;

            let mut rolling = RollingWindow::for_duration(window, poll);
            for i in 0..(bound * 3) {
                rolling.push(i as f64);
                assert!(rolling.len() <= bound.max(1));
            }
        }
    }

    #[test]
    fn test_large_capacity_grows_on_demand() {
        let mut window =
            RollingWindow::for_duration(Duration::from_secs(3600), Duration::from_nanos(1));
        assert_eq!(window.capacity(), 3_600_000_000_000);

        window.push(4.0);
        window.push(8.0);
        assert_eq!(window.len(), 2);
        assert_eq!(window.mean(), Some(6.0));
    }

    #[test]
    fn test_empty_window_has_no_mean() {
        let window = RollingWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.is_empty());
        assert!(window.mean().is_none());
    }
}
