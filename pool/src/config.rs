//! Configuration for a [crate::Factory].

use crate::{stats::DEFAULT_SAMPLES, Error};
use std::time::Duration;

/// Configuration for a [crate::Factory].
///
/// The right values are application dependent. [Config::default] is a
/// reasonable starting point for socket-sized I/O buffers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of buffers each new size class reserves room for.
    pub buffers_per_size: usize,
    /// Number of buffers the pool is warmed with and replenished towards.
    pub min_buffers: usize,
    /// Maximum number of distinct size classes held at once.
    ///
    /// This bounds the variety of sizes, not the number of buffers.
    pub max_distinct_sizes: usize,
    /// Capacity of warm-up buffers and the smallest replenished buffer.
    pub min_buffer_size: usize,
    /// Largest capacity the replenisher will allocate.
    pub max_buffer_size: usize,
    /// Period of the replenisher. [Duration::ZERO] disables it.
    pub replenish_interval: Duration,
    /// Number of usage samples used to size replenished buffers.
    pub samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffers_per_size: 100,
            min_buffers: 10,
            max_distinct_sizes: 1000,
            min_buffer_size: 1024,
            max_buffer_size: 4096,
            replenish_interval: Duration::from_secs(10),
            samples: DEFAULT_SAMPLES,
        }
    }
}

impl Config {
    /// Validates that all configuration values are valid.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid configuration value found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.buffers_per_size == 0 {
            return Err(Error::ZeroBuffersPerSize);
        }
        if self.max_distinct_sizes == 0 {
            return Err(Error::ZeroMaxDistinctSizes);
        }
        if self.min_buffer_size == 0 {
            return Err(Error::ZeroMinBufferSize);
        }
        if self.max_buffer_size == 0 {
            return Err(Error::ZeroMaxBufferSize);
        }
        if self.min_buffer_size > self.max_buffer_size {
            return Err(Error::MinBufferSizeExceedsMax(
                self.min_buffer_size,
                self.max_buffer_size,
            ));
        }
        if self.samples == 0 {
            return Err(Error::ZeroSamples);
        }
        Ok(())
    }
}
