//! Formatting helpers for log output.
//!
//! Run summaries are logged as counts with thousands separators, elapsed time in
//! compact units, and throughput in units per second.

use std::time::{Duration, Instant};

/// Formats a count with comma thousands separators.
///
/// ```
/// use batchmap_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a duration in human-readable form (e.g. "45s", "2m 15s", "1h 30m").
///
/// ```
/// use batchmap_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => match (secs / 60, secs % 60) {
            (mins, 0) => format!("{mins}m"),
            (mins, rest) => format!("{mins}m {rest}s"),
        },
        _ => match (secs / 3600, (secs % 3600) / 60) {
            (hours, 0) => format!("{hours}h"),
            (hours, mins) => format!("{hours}h {mins}m"),
        },
    }
}

/// Mean rate in units per second; zero when no measurable time has passed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate_per_sec(count: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs < 0.001 { 0.0 } else { count as f64 / secs }
}

/// Formats a throughput such as "1,000 lines/s".
///
/// Rates under one per second are reported per minute.
///
/// ```
/// use batchmap_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(1000, Duration::from_secs(1), "lines"), "1,000 lines/s");
/// assert_eq!(format_rate(30, Duration::from_secs(60), "files"), "30.0 files/min");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration, unit: &str) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} {unit}/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} {unit}/s", format_count(rate as u64))
    } else {
        format!("{:.1} {unit}/min", count as f64 / (secs / 60.0))
    }
}

/// Times one stage of a run and logs its start and completion.
///
/// ```no_run
/// use batchmap_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Writing output", "lines");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    unit: &'static str,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new timer and logs the start.
    #[must_use]
    pub fn new(operation: &str, unit: &'static str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), unit, start_time: Instant::now() }
    }

    /// Time since the timer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the completion with a count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.elapsed();
        log::info!(
            "{} completed: {} {} in {} ({})",
            self.operation,
            format_count(count),
            self.unit,
            format_duration(duration),
            format_rate(count, duration, self.unit)
        );
    }
}
