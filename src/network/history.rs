//! Bounded FIFO used to smooth fee and block-time samples.

use std::collections::VecDeque;

/// Ring buffer with fixed capacity; the oldest value is evicted first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, returning the evicted one when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.values.len() >= self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }
}

impl RollingWindow<u64> {
    pub fn mean(&self) -> Option<u64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: u128 = self.values.iter().map(|v| *v as u128).sum();
        Some((sum / self.values.len() as u128) as u64)
    }
}
