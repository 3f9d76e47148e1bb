//! Rolling latency window and the sequential single-operation sampler.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::ResourceBackend;
use crate::error::{HarnessError, Result};

/// Bounded, insertion-ordered rolling buffer of operation durations.
/// Once full, the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
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

    /// Percentile and mean statistics over the retained samples
    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let total: Duration = sorted.iter().sum();
        let mean = total / sorted.len() as u32;
        LatencyStats {
            samples: sorted.len(),
            min_ms: millis(sorted[0]),
            mean_ms: millis(mean),
            p50_ms: millis(percentile(&sorted, 50.0)),
            p90_ms: millis(percentile(&sorted, 90.0)),
            p99_ms: millis(percentile(&sorted, 99.0)),
            max_ms: millis(sorted[sorted.len() - 1]),
        }
    }

    #[cfg(test)]
    fn contents(&self) -> Vec<Duration> {
        self.samples.iter().copied().collect()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

/// Nearest-rank percentile over an ascending-sorted slice
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    let rank = ((q / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Latency statistics for one benchmark run, in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Operation type a latency run measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampledOperation {
    Create,
    List,
}

/// Times N strictly-sequential operations so each sample reflects
/// single-operation latency rather than cross-request contention
#[derive(Debug)]
pub struct LatencySampler {
    iterations: usize,
    window: SampleWindow,
}

impl LatencySampler {
    pub fn new(iterations: usize, window_size: usize) -> Self {
        Self {
            iterations,
            window: SampleWindow::new(window_size),
        }
    }

    /// Runs the configured iterations. The first failed operation aborts the
    /// whole run with no statistics: partial timing data is not a comparable
    /// sample.
    pub async fn run(
        mut self,
        backend: &ResourceBackend,
        operation: SampledOperation,
    ) -> Result<LatencyStats> {
        for i in 0..self.iterations {
            let start = Instant::now();
            match operation {
                SampledOperation::Create => {
                    backend.create(i).await.map_err(|e| {
                        HarnessError::Measurement(format!("create iteration {i}: {e}"))
                    })?;
                }
                SampledOperation::List => {
                    backend.list().await.map_err(|e| {
                        HarnessError::Measurement(format!("list iteration {i}: {e}"))
                    })?;
                }
            }
            self.window.record(start.elapsed());
        }
        debug!(
            iterations = self.iterations,
            retained = self.window.len(),
            "latency sampling finished"
        );
        Ok(self.window.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut window = SampleWindow::new(3);
        for ms in 1..=5u64 {
            window.record(Duration::from_millis(ms));
        }
        assert_eq!(
            window.contents(),
            vec![
                Duration::from_millis(3),
                Duration::from_millis(4),
                Duration::from_millis(5),
            ]
        );
    }

    #[test]
    fn test_stats_cover_retained_samples_only() {
        let mut window = SampleWindow::new(4);
        for ms in 1..=10u64 {
            window.record(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert_eq!(stats.samples, 4);
        // oldest six samples were evicted
        assert!((stats.min_ms - 7.0).abs() < 1e-9);
        assert!((stats.max_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_stats_are_zero() {
        let stats = SampleWindow::new(8).stats();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.max_ms, 0.0);
    }

    #[test]
    fn test_percentiles_on_known_distribution() {
        let mut window = SampleWindow::new(100);
        for ms in 1..=100u64 {
            window.record(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert!((stats.p50_ms - 50.0).abs() < 1e-9);
        assert!((stats.p90_ms - 90.0).abs() < 1e-9);
        assert!((stats.p99_ms - 99.0).abs() < 1e-9);
        assert!((stats.mean_ms - 50.5).abs() < 0.01);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_capacity(capacity in 1usize..64, count in 0usize..256) {
            let mut window = SampleWindow::new(capacity);
            for i in 0..count {
                window.record(Duration::from_micros(i as u64));
            }
            prop_assert_eq!(window.len(), count.min(capacity));
        }

        #[test]
        fn prop_window_retains_most_recent(capacity in 1usize..32, count in 1usize..128) {
            let mut window = SampleWindow::new(capacity);
            for i in 0..count {
                window.record(Duration::from_micros(i as u64));
            }
            let retained = window.contents();
            let first_kept = count.saturating_sub(capacity);
            let expected: Vec<Duration> = (first_kept..count)
                .map(|i| Duration::from_micros(i as u64))
                .collect();
            prop_assert_eq!(retained, expected);
        }
    }
}
