//! Thread-safe throughput meter.
//!
//! A [`ProgressMeter`] counts units (lines read, records processed, lines
//! written) from any number of threads, logs a progress line whenever the count
//! crosses an interval boundary, and reports the mean rate since creation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::info;

use crate::logging::{format_count, format_duration, format_rate, rate_per_sec};

/// Default number of units between progress log lines.
pub const DEFAULT_LOG_INTERVAL: u64 = 1_000_000;

/// Counts units across threads and logs at regular intervals.
///
/// ```
/// use batchmap_lib::progress::ProgressMeter;
///
/// let meter = ProgressMeter::new("Read", "lines").with_interval(100);
/// for _ in 0..250 {
///     meter.mark(1); // logs at 100 and 200
/// }
/// assert_eq!(meter.count(), 250);
/// meter.log_final();
/// ```
pub struct ProgressMeter {
    label: String,
    unit: &'static str,
    interval: u64,
    count: AtomicU64,
    start: Instant,
}

impl ProgressMeter {
    /// Creates a meter with a count of 0 and the default interval.
    #[must_use]
    pub fn new(label: impl Into<String>, unit: &'static str) -> Self {
        Self {
            label: label.into(),
            unit,
            interval: DEFAULT_LOG_INTERVAL,
            count: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Sets the number of units between progress log lines. Zero disables them.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Adds `n` units, logging once for each interval boundary crossed.
    pub fn mark(&self, n: u64) {
        if n == 0 {
            return;
        }
        let prev = self.count.fetch_add(n, Ordering::Relaxed);
        if self.interval == 0 {
            return;
        }
        let now = prev + n;
        for i in (prev / self.interval + 1)..=(now / self.interval) {
            let milestone = i * self.interval;
            info!(
                "{} {} {} ({})",
                self.label,
                format_count(milestone),
                self.unit,
                format_rate(milestone, self.elapsed(), self.unit)
            );
        }
    }

    /// Units counted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Time since the meter was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Mean units per second since the meter was created.
    #[must_use]
    pub fn mean_rate(&self) -> f64 {
        rate_per_sec(self.count(), self.elapsed())
    }

    /// Logs the final count, elapsed time, and mean rate.
    pub fn log_final(&self) {
        let count = self.count();
        let elapsed = self.elapsed();
        info!(
            "{} {} {} in {} ({})",
            self.label,
            format_count(count),
            self.unit,
            format_duration(elapsed),
            format_rate(count, elapsed, self.unit)
        );
    }
}
