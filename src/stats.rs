//! Running session statistics
//!
//! [`StatisticsAggregator`] folds every accepted batch into [`SessionStats`] and
//! hands back a [`DerivedStats`] value, which is what gets published. Consumers
//! never see the mutable accumulator itself.

use std::time::Instant;

use serde::Serialize;

use crate::types::Batch;

/// Session-wide accumulators.
///
/// `min`/`max` are `None` until the first reading arrives so that no finite
/// sentinel can collide with real data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub packets_received: u64,
    pub samples_received: u64,
    pub running_sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub last_arrival: Option<Instant>,
    /// Samples per second over the most recent inter-batch gap
    pub instantaneous_rate: f64,
}

impl SessionStats {
    /// Mean of every reading this session, `None` before the first one.
    pub fn mean(&self) -> Option<f64> {
        (self.samples_received > 0).then(|| self.running_sum / self.samples_received as f64)
    }
}

/// Published view of the statistics after a batch.
///
/// Every `Option` is `None` in a fresh or cleared session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedStats {
    pub last_value: Option<f64>,
    /// `max - min` over the most recent batch only
    pub packet_range: Option<f64>,
    pub session_mean: Option<f64>,
    pub session_min: Option<f64>,
    pub session_max: Option<f64>,
    pub instantaneous_rate: f64,
    pub packets_received: u64,
    pub samples_received: u64,
}

/// Folds batches into [`SessionStats`].
#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    stats: SessionStats,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `batch`, which arrived at `now`, into the session.
    ///
    /// The first batch of a session leaves the rate at `0.0`; a zero gap
    /// between arrivals leaves it unchanged.
    pub fn update(&mut self, batch: &Batch, now: Instant) -> DerivedStats {
        let stats = &mut self.stats;
        stats.packets_received += 1;
        stats.samples_received += batch.len() as u64;

        let mut packet_min = f64::INFINITY;
        let mut packet_max = f64::NEG_INFINITY;
        for &value in batch.readings() {
            stats.running_sum += value;
            packet_min = packet_min.min(value);
            packet_max = packet_max.max(value);
        }

        stats.min = Some(stats.min.map_or(packet_min, |m| m.min(packet_min)));
        stats.max = Some(stats.max.map_or(packet_max, |m| m.max(packet_max)));

        if let Some(last) = stats.last_arrival {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                stats.instantaneous_rate = batch.len() as f64 / elapsed;
            }
        }
        stats.last_arrival = Some(now);

        DerivedStats {
            last_value: Some(batch.last()),
            packet_range: Some(packet_max - packet_min),
            session_mean: stats.mean(),
            session_min: stats.min,
            session_max: stats.max,
            instantaneous_rate: stats.instantaneous_rate,
            packets_received: stats.packets_received,
            samples_received: stats.samples_received,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Back to the unset state of a fresh session.
    pub fn reset(&mut self) {
        self.stats = SessionStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn batch(values: &[f64], at: Instant) -> Batch {
        Batch::new(values.to_vec(), at).unwrap()
    }

    #[test]
    fn first_batch_initializes_everything() {
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();

        let derived = agg.update(&batch(&[1.0, 2.0, 3.0], t0), t0);

        assert_eq!(derived.packets_received, 1);
        assert_eq!(derived.samples_received, 3);
        assert_eq!(derived.last_value, Some(3.0));
        assert_eq!(derived.packet_range, Some(2.0));
        assert_eq!(derived.session_mean, Some(2.0));
        assert_eq!(derived.session_min, Some(1.0));
        assert_eq!(derived.session_max, Some(3.0));
        assert_eq!(derived.instantaneous_rate, 0.0);
        assert_eq!(agg.stats().last_arrival, Some(t0));
    }

    #[test]
    fn rate_uses_gap_since_previous_batch() {
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();
        agg.update(&batch(&[1.0, 2.0, 3.0], t0), t0);

        let t1 = t0 + Duration::from_millis(500);
        let derived = agg.update(&batch(&[1.0, 1.1, 1.2, 1.3, 1.4], t1), t1);

        assert!((derived.instantaneous_rate - 10.0).abs() < 1e-9);
        assert_eq!(derived.packets_received, 2);
        assert_eq!(derived.samples_received, 8);
    }

    #[test]
    fn zero_gap_leaves_rate_unchanged() {
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();
        agg.update(&batch(&[1.0], t0), t0);
        let t1 = t0 + Duration::from_millis(250);
        agg.update(&batch(&[1.0, 2.0], t1), t1);

        let derived = agg.update(&batch(&[5.0, 6.0, 7.0], t1), t1);

        assert!((derived.instantaneous_rate - 8.0).abs() < 1e-9);
        assert!(derived.instantaneous_rate.is_finite());
    }

    #[test]
    fn packet_range_covers_batch_only() {
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();
        agg.update(&batch(&[0.0, 10.0], t0), t0);

        let derived = agg.update(&batch(&[4.0, 4.5], t0), t0);

        assert_eq!(derived.packet_range, Some(0.5));
        assert_eq!(derived.session_min, Some(0.0));
        assert_eq!(derived.session_max, Some(10.0));
    }

    #[test]
    fn negative_readings_extend_max_correctly() {
        // The all-negative case is where a MIN_VALUE-style sentinel goes wrong
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();

        let derived = agg.update(&batch(&[-3.0, -2.0], t0), t0);

        assert_eq!(derived.session_max, Some(-2.0));
        assert_eq!(derived.session_min, Some(-3.0));
    }

    #[test]
    fn reset_returns_to_unset() {
        let mut agg = StatisticsAggregator::new();
        let t0 = Instant::now();
        agg.update(&batch(&[1.0, 2.0], t0), t0);

        agg.reset();

        let stats = agg.stats();
        assert_eq!(stats.samples_received, 0);
        assert_eq!(stats.min, None);
        assert_eq!(stats.max, None);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.last_arrival, None);
        assert_eq!(stats.instantaneous_rate, 0.0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn aggregates_match_recomputation(
                batches in prop::collection::vec(
                    prop::collection::vec(-5.0f64..5.0, 1..20),
                    1..40,
                )
            ) {
                let mut agg = StatisticsAggregator::new();
                let t0 = Instant::now();
                let mut history = Vec::new();

                for (i, values) in batches.iter().enumerate() {
                    let at = t0 + Duration::from_millis(10 * i as u64);
                    agg.update(&Batch::new(values.clone(), at).unwrap(), at);
                    history.extend_from_slice(values);
                }

                let stats = agg.stats();
                let expected_mean = history.iter().sum::<f64>() / history.len() as f64;
                let expected_min = history.iter().copied().fold(f64::INFINITY, f64::min);
                let expected_max = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);

                prop_assert_eq!(stats.samples_received, history.len() as u64);
                prop_assert_eq!(stats.packets_received, batches.len() as u64);
                prop_assert!((stats.mean().unwrap() - expected_mean).abs() < 1e-9);
                prop_assert_eq!(stats.min, Some(expected_min));
                prop_assert_eq!(stats.max, Some(expected_max));
                for value in &history {
                    prop_assert!(stats.min.unwrap() <= *value && *value <= stats.max.unwrap());
                }
            }
        }
    }
}
