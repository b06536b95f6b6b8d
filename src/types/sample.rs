//! Sample and batch types

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// One buffered reading with its session-wide index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Strictly increasing for the lifetime of a session
    pub index: u64,
    /// Decoded voltage; no range restriction is applied
    pub value: f64,
}

impl Sample {
    pub fn new(index: u64, value: f64) -> Self {
        Self { index, value }
    }
}

/// Readings decoded from one frame, plus the frame's arrival time.
///
/// A batch is never empty; the parser rejects empty frames before one is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    readings: Vec<f64>,
    received_at: Instant,
}

impl Batch {
    /// Build a batch, returning `None` when `readings` is empty.
    pub fn new(readings: Vec<f64>, received_at: Instant) -> Option<Self> {
        if readings.is_empty() { None } else { Some(Self { readings, received_at }) }
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// The final reading in arrival order.
    pub fn last(&self) -> f64 {
        // Non-empty by construction
        self.readings[self.readings.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batches_are_rejected() {
        assert!(Batch::new(Vec::new(), Instant::now()).is_none());
    }

    #[test]
    fn last_is_final_reading() {
        let batch = Batch::new(vec![0.5, 1.5, 2.5], Instant::now()).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.last(), 2.5);
        assert!(!batch.is_empty());
    }
}
