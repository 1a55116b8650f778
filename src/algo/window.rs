use std::collections::VecDeque;

use crate::sensor::Reading;

/// Bounded FIFO of the most recent readings for one sensor.
#[derive(Debug, Clone)]
pub struct Window {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() >= self.capacity
    }

    /// Append, evicting the oldest entry when full. Returns the evicted reading.
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        let evicted = if self.is_full() {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);
        evicted
    }

    /// Change the bound, dropping the oldest entries if it shrank.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.value).collect()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.back()
    }
}
