//! Bounded rolling window of samples for visualization

use std::collections::VecDeque;

use crate::types::Sample;

/// Default number of samples kept for display.
pub const DEFAULT_CAPACITY: usize = 500;

/// FIFO-evicting window that owns the session's sample index.
///
/// Indices are assigned on append and keep counting across evictions; only
/// [`SampleBuffer::clear`] rewinds them to zero.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    next_index: u64,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity, next_index: 0 }
    }

    /// Append `values` in order, evicting the oldest samples past capacity.
    pub fn append(&mut self, values: &[f64]) {
        for &value in values {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(Sample::new(self.next_index, value));
            self.next_index += 1;
        }
    }

    /// Copy of the retained samples, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Empty the window and rewind the index counter.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.next_index = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index the next appended value will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }
}
