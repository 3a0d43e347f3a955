//! Bounded bar store, oldest evicted first

use std::collections::VecDeque;

use super::bar::Bar;

/// Bars retained per timeframe
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct BarHistory {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a bar, evicting the oldest when full
    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Chronological iteration, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Bar> + ExactSizeIterator {
        self.bars.iter()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BarHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bar(i: i64) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 9)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            + Duration::seconds(i * 10);
        Bar::new(ts, 100.0, 101.0, 99.0, 100.0 + i as f64, 10)
    }

    #[test]
    fn test_eviction_keeps_chronological_order() {
        let mut history = BarHistory::new(3);
        for i in 0..5 {
            history.push(bar(i));
        }

        assert_eq!(history.len(), 3);
        let closes: Vec<f64> = history.iter().map(|b| b.close()).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
        assert_eq!(history.last().unwrap().close(), 104.0);
    }

    #[test]
    fn test_default_capacity() {
        let mut history = BarHistory::default();
        for i in 0..600 {
            history.push(bar(i));
        }
        assert_eq!(history.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().close(), 200.0);
    }
}
