//! Run summary returned by the mappers.

use std::path::Path;

use anyhow::Context;
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use super::reader::ReadSummary;
use super::sink::WriteSummary;
use crate::errors::{PipelineError, Result};

/// Counts and rates for one completed run, written as a one-row TSV.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Input lines read across all files.
    pub lines_read: u64,
    /// Input files read to completion.
    pub files_read: usize,
    /// Lines passed through the transform.
    pub records_processed: u64,
    /// Output lines written.
    pub lines_written: u64,
    /// Mean input lines per second.
    pub read_rate: f64,
    /// Mean output lines per second over the whole run.
    pub mean_throughput: f64,
    /// Wall-clock duration of the run.
    pub elapsed_secs: f64,
}

impl RunMetadata {
    /// Combines stage summaries into the run's metadata.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_stages(
        read: &ReadSummary,
        records_processed: u64,
        written: &WriteSummary,
        elapsed_secs: f64,
    ) -> Self {
        let mean_throughput =
            if elapsed_secs > 0.0 { written.lines_written as f64 / elapsed_secs } else { 0.0 };
        Self {
            lines_read: read.lines_read,
            files_read: read.files_read,
            records_processed,
            lines_written: written.lines_written,
            read_rate: read.read_rate,
            mean_throughput,
            elapsed_secs,
        }
    }

    /// Fails a run that completed without writing anything.
    ///
    /// # Errors
    /// Returns [`PipelineError::NoRowsWritten`] when `lines_written` is zero.
    pub fn ensure_rows_written(self) -> Result<Self> {
        if self.lines_written == 0 {
            return Err(PipelineError::NoRowsWritten);
        }
        Ok(self)
    }

    /// Writes this record to `path` as a single-row TSV with a header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_tsv(&self, path: &Path) -> anyhow::Result<()> {
        DelimFile::default()
            .write_tsv(&path, [self])
            .with_context(|| format!("Failed to write run metadata: {}", path.display()))
    }
}
