//! Bounded reading history

use std::collections::VecDeque;

use crate::types::Reading;

/// The most recent readings in arrival order; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct ReadingHistory {
    buffer: VecDeque<Reading>,
    capacity: usize,
}

impl ReadingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { buffer: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, reading: Reading) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The `N` newest readings, oldest first.
    pub fn last<const N: usize>(&self) -> Option<[Reading; N]> {
        let start = self.buffer.len().checked_sub(N)?;
        let mut out = [Reading::default(); N];
        for (slot, reading) in out.iter_mut().zip(self.buffer.range(start..)) {
            *slot = *reading;
        }
        Some(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.buffer.iter()
    }
}
