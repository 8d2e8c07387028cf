//! Sliding window of observed buffer usage.
//!
//! Every released buffer contributes the number of bytes the caller actually
//! used. Aggregates are recomputed from the retained samples on each query,
//! so they only ever reflect the most recent `capacity` observations.

use std::{collections::VecDeque, fmt, num::NonZeroUsize};

/// Default number of samples retained by [RollingStats].
pub const DEFAULT_SAMPLES: usize = 1000;

/// Bounded FIFO of the most recent samples.
#[derive(Clone, Debug)]
pub struct RollingStats {
    samples: VecDeque<i64>,
    capacity: NonZeroUsize,
}

impl RollingStats {
    /// Creates an empty window that retains at most `capacity` samples.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Records a sample, evicting the oldest one if the window is full.
    pub fn record(&mut self, value: i64) {
        if self.samples.len() >= self.capacity.get() {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of samples currently retained.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples have been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates over retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.samples.iter()
    }

    /// Smallest retained sample (0 if empty).
    pub fn min(&self) -> i64 {
        self.samples.iter().copied().min().unwrap_or(0)
    }

    /// Largest retained sample (0 if empty).
    pub fn max(&self) -> i64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Arithmetic mean of retained samples (0.0 if empty).
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&v| v as f64).sum();
        sum / self.samples.len() as f64
    }

    /// Population standard deviation of retained samples (0.0 if empty).
    pub fn std_dev(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance: f64 = self
            .samples
            .iter()
            .map(|&v| {
                let delta = v as f64 - mean;
                delta * delta
            })
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }

    /// Computes all aggregates at once.
    pub fn summary(&self) -> Summary {
        Summary {
            count: self.len(),
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            std_dev: self.std_dev(),
        }
    }
}

/// Point-in-time aggregates of a [RollingStats] window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// Number of samples in the window.
    pub count: usize,
    /// Smallest sample (0 if the window is empty).
    pub min: i64,
    /// Largest sample (0 if the window is empty).
    pub max: i64,
    /// Arithmetic mean (0.0 if the window is empty).
    pub mean: f64,
    /// Population standard deviation (0.0 if the window is empty).
    pub std_dev: f64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "samples: {}, min: {}, mean: {:.2} (stddev: {:.2}), max: {}",
            self.count, self.min, self.mean, self.std_dev, self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(capacity: usize) -> RollingStats {
        RollingStats::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_record_evicts_oldest() {
        let mut stats = window(3);
        for value in 0..4 {
            stats.record(value);
        }
        assert_eq!(stats.len(), 3);
        let retained: Vec<_> = stats.iter().copied().collect();
        assert_eq!(retained, vec![1, 2, 3]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut stats = window(DEFAULT_SAMPLES);
        for value in 0..(DEFAULT_SAMPLES as i64 * 3) {
            stats.record(value);
            assert!(stats.len() <= stats.capacity());
        }
        assert_eq!(stats.min(), DEFAULT_SAMPLES as i64 * 2);
        assert_eq!(stats.max(), DEFAULT_SAMPLES as i64 * 3 - 1);
    }

    #[test]
    fn test_aggregates() {
        let mut stats = window(3);
        stats.record(1);
        stats.record(2);
        stats.record(3);
        assert_eq!(stats.min(), 1);
        assert_eq!(stats.max(), 3);
        assert_eq!(stats.mean(), 2.0);
        // Population variance of {1, 2, 3} is 2/3
        assert!((stats.std_dev() - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_aggregates_follow_window() {
        let mut stats = window(2);
        stats.record(100);
        stats.record(4);
        stats.record(6);
        assert_eq!(stats.min(), 4);
        assert_eq!(stats.max(), 6);
        assert_eq!(stats.mean(), 5.0);
        assert_eq!(stats.std_dev(), 1.0);
    }

    #[test]
    fn test_empty_sentinels() {
        let stats = window(10);
        assert!(stats.is_empty());
        assert_eq!(stats.summary(), Summary::default());
    }

    #[test]
    fn test_summary_display() {
        let mut stats = window(4);
        stats.record(2);
        stats.record(4);
        assert_eq!(
            stats.summary().to_string(),
            "samples: 2, min: 2, mean: 3.00 (stddev: 1.00), max: 4"
        );
    }
}
