//! Run configuration and the sizing rules for threads and queues.

use std::time::Duration;

use crate::errors::{PipelineError, Result};
use crate::validation::validate_positive;

/// Default number of lines per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default gzip level for compressed output.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Highest gzip level accepted by both output encoders.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Largest queue a run will allocate. Crossbeam allocates every slot up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Default wait used by writers and consumers when polling a queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default period of the fail-fast monitor.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// Threads to use for CPU-bound work: all cores but one, never fewer than one.
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get().saturating_sub(1).max(1))
}

/// Configuration shared by the mappers and the reducer.
///
/// Unset sizes are derived from `threads` when read through the accessor
/// methods, so a config built with only [`PipelineConfig::new`] scales everything else.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Compute worker threads.
    pub threads: usize,
    /// Lines per batch handed to a compute worker.
    pub batch_size: usize,
    /// Reader threads for multi-file runs.
    pub reader_threads: Option<usize>,
    /// Batches in flight ahead of the writer (ordered) and the compute job queue.
    pub queue_length: Option<usize>,
    /// Lines buffered between readers and compute workers.
    pub read_queue_capacity: Option<usize>,
    /// Result batches buffered between compute workers and the writer.
    pub write_queue_capacity: Option<usize>,
    /// Partial accumulators buffered ahead of the reducer.
    pub accumulator_queue_capacity: Option<usize>,
    /// Compression threads for `.gz` output. One selects a single-threaded encoder.
    pub gzip_threads: Option<usize>,
    /// Gzip level for `.gz` output.
    pub compression_level: u32,
    /// Stop after this many output lines have been written.
    pub sample: Option<u64>,
    /// Queue poll wait for writers and consumers.
    pub poll_interval: Duration,
    /// Period of the fail-fast monitor.
    pub monitor_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(default_threads())
    }
}

impl PipelineConfig {
    /// Creates a configuration for `threads` compute workers.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            batch_size: DEFAULT_BATCH_SIZE,
            reader_threads: None,
            queue_length: None,
            read_queue_capacity: None,
            write_queue_capacity: None,
            accumulator_queue_capacity: None,
            gzip_threads: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            sample: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_reader_threads(mut self, threads: usize) -> Self {
        self.reader_threads = Some(threads);
        self
    }

    #[must_use]
    pub fn with_queue_length(mut self, length: usize) -> Self {
        self.queue_length = Some(length);
        self
    }

    #[must_use]
    pub fn with_read_queue_capacity(mut self, capacity: usize) -> Self {
        self.read_queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_accumulator_queue_capacity(mut self, capacity: usize) -> Self {
        self.accumulator_queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_gzip_threads(mut self, threads: usize) -> Self {
        self.gzip_threads = Some(threads);
        self
    }

    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn with_sample(mut self, sample: Option<u64>) -> Self {
        self.sample = sample;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Reader threads: `threads / 2.5`, at least one.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn reader_threads(&self) -> usize {
        self.reader_threads.unwrap_or_else(|| ((self.threads as f64 / 2.5) as usize).max(1))
    }

    /// In-flight batch limit: four per compute thread.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.queue_length.unwrap_or_else(|| derived_capacity(&[self.threads, 4]))
    }

    /// Read queue lines: four full batches per compute thread, capped at
    /// [`MAX_QUEUE_CAPACITY`].
    #[must_use]
    pub fn read_queue_capacity(&self) -> usize {
        self.read_queue_capacity
            .unwrap_or_else(|| derived_capacity(&[self.threads, self.batch_size, 4]))
    }

    #[must_use]
    pub fn write_queue_capacity(&self) -> usize {
        self.write_queue_capacity.unwrap_or_else(|| derived_capacity(&[self.threads, 4]))
    }

    #[must_use]
    pub fn accumulator_queue_capacity(&self) -> usize {
        self.accumulator_queue_capacity.unwrap_or_else(|| derived_capacity(&[self.threads, 2]))
    }

    /// Compression threads: a fifth of the compute threads, at least one.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn gzip_threads(&self) -> usize {
        self.gzip_threads.unwrap_or_else(|| ((self.threads as f64 * 0.2).round() as usize).max(1))
    }

    /// Checks that every size is positive and that explicit queue capacities
    /// fit within [`MAX_QUEUE_CAPACITY`].
    ///
    /// # Errors
    /// Returns `InvalidParameter` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        validate_positive(self.threads, "threads")?;
        validate_positive(self.batch_size, "batch-size")?;
        let explicit = [
            (self.reader_threads, "reader-threads"),
            (self.queue_length, "queue-length"),
            (self.read_queue_capacity, "read-queue-capacity"),
            (self.write_queue_capacity, "write-queue-capacity"),
            (self.accumulator_queue_capacity, "accumulator-queue-capacity"),
            (self.gzip_threads, "gzip-threads"),
        ];
        for (value, name) in explicit {
            if let Some(value) = value {
                validate_positive(value, name)?;
            }
        }
        let capacities = [
            (self.queue_length, "queue-length"),
            (self.read_queue_capacity, "read-queue-capacity"),
            (self.write_queue_capacity, "write-queue-capacity"),
            (self.accumulator_queue_capacity, "accumulator-queue-capacity"),
        ];
        for (value, name) in capacities {
            if let Some(value) = value.filter(|&v| v > MAX_QUEUE_CAPACITY) {
                return Err(PipelineError::InvalidParameter {
                    parameter: name.to_string(),
                    reason: format!("must be at most {MAX_QUEUE_CAPACITY}, got {value}"),
                });
            }
        }
        if let Some(sample) = self.sample {
            validate_positive(sample, "samples")?;
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(PipelineError::InvalidParameter {
                parameter: "compression-level".to_string(),
                reason: format!(
                    "must be at most {MAX_COMPRESSION_LEVEL}, got {}",
                    self.compression_level
                ),
            });
        }
        Ok(())
    }
}

/// Product of `factors`, saturating at [`MAX_QUEUE_CAPACITY`].
fn derived_capacity(factors: &[usize]) -> usize {
    factors
        .iter()
        .try_fold(1_usize, |acc, &f| acc.checked_mul(f))
        .map_or(MAX_QUEUE_CAPACITY, |n| n.min(MAX_QUEUE_CAPACITY))
}
