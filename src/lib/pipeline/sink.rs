//! Output file and the writer stage.
//!
//! [`OutputSink`] picks plain, single-threaded gzip, or block-parallel gzip
//! encoding from the destination name. [`LineSink`] adds line framing, the
//! written-line meter, and the optional sample cap. [`SinkWriter`] runs a
//! `LineSink` on its own thread, draining the write queue of a multi-file run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{error, info};

use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use super::queue::BoundedQueue;
use super::state::{AbortSignal, PipelineState};
use crate::errors::{PipelineError, Result};
use crate::progress::ProgressMeter;

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// True if output to `path` should be gzip-compressed.
#[must_use]
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

// ============================================================================
// Output encodings
// ============================================================================

/// The destination file, compressed according to its name.
pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    ParallelGzip(super::gzip::ParallelGzipWriter<BufWriter<File>>),
}

impl OutputSink {
    /// Creates `path`. A `.gz` name selects gzip, parallel when `gzip_threads > 1`.
    ///
    /// # Errors
    /// Returns `Write` if the file cannot be created.
    pub fn create(path: &Path, gzip_threads: usize, compression_level: u32) -> Result<Self> {
        let file = File::create(path)
            .map_err(|source| PipelineError::Write { path: path.to_path_buf(), source })?;
        let buffered = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        if !is_gzip_path(path) {
            return Ok(Self::Plain(buffered));
        }
        if gzip_threads > 1 {
            let writer =
                super::gzip::ParallelGzipWriter::new(buffered, gzip_threads, compression_level)?;
            Ok(Self::ParallelGzip(writer))
        } else {
            Ok(Self::Gzip(GzEncoder::new(buffered, Compression::new(compression_level))))
        }
    }

    /// Flushes all buffered and compressed data and closes the file.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w.finish()?,
            Self::ParallelGzip(w) => w.finish()?,
        };
        inner.flush()
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::ParallelGzip(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.write_all(buf),
            Self::Gzip(w) => w.write_all(buf),
            Self::ParallelGzip(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::ParallelGzip(w) => w.flush(),
        }
    }
}

// ============================================================================
// Line framing and sample cap
// ============================================================================

/// Totals reported by a writer when it closes its output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteSummary {
    pub lines_written: u64,
    pub write_rate: f64,
}

/// Whether a sink will take more lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Open,
    /// The sample cap was reached; further lines are refused.
    Full,
}

/// Newline-framed output with a written-line count and optional sample cap.
pub struct LineSink {
    path: PathBuf,
    out: OutputSink,
    meter: ProgressMeter,
    sample: Option<u64>,
}

impl LineSink {
    /// # Errors
    /// Returns `Write` if the output cannot be created.
    pub fn create(
        path: &Path,
        gzip_threads: usize,
        compression_level: u32,
        sample: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            out: OutputSink::create(path, gzip_threads, compression_level)?,
            meter: ProgressMeter::new("Wrote", "lines"),
            sample,
        })
    }

    #[must_use]
    pub fn lines_written(&self) -> u64 {
        self.meter.count()
    }

    fn write_err(&self, source: io::Error) -> PipelineError {
        PipelineError::Write { path: self.path.clone(), source }
    }

    /// Writes `lines` in order, stopping early once the sample cap is met.
    ///
    /// # Errors
    /// Returns `Write` on an I/O failure.
    pub fn write_lines(&mut self, lines: Vec<String>) -> Result<SinkStatus> {
        for line in lines {
            if self.sample.is_some_and(|cap| self.meter.count() >= cap) {
                return Ok(SinkStatus::Full);
            }
            let written =
                self.out.write_all(line.as_bytes()).and_then(|()| self.out.write_all(b"\n"));
            written.map_err(|e| self.write_err(e))?;
            self.meter.mark(1);
        }
        if self.sample.is_some_and(|cap| self.meter.count() >= cap) {
            return Ok(SinkStatus::Full);
        }
        Ok(SinkStatus::Open)
    }

    /// Closes the output and reports what was written.
    ///
    /// # Errors
    /// Returns `Write` if the final flush fails.
    pub fn finish(self) -> Result<WriteSummary> {
        let Self { path, out, meter, .. } = self;
        out.finish().map_err(|source| PipelineError::Write { path, source })?;
        meter.log_final();
        Ok(WriteSummary { lines_written: meter.count(), write_rate: meter.mean_rate() })
    }
}

// ============================================================================
// Writer stage
// ============================================================================

/// Drains a write queue into a [`LineSink`] on a dedicated thread.
///
/// The writer ends once `processing_finished` is set and the queue is empty,
/// when the sample cap fills, or when it is aborted.
pub struct SinkWriter {
    pool: WorkerPool,
    handle: TaskHandle<WriteSummary>,
}

impl SinkWriter {
    /// Starts the writer. `on_sample` is raised when the sample cap fills, so
    /// upstream stages stop producing.
    ///
    /// # Errors
    /// Returns `Spawn` if the writer thread cannot be started.
    pub fn start(
        sink: LineSink,
        queue: Arc<BoundedQueue<Vec<String>>>,
        state: Arc<PipelineState>,
        poll_interval: Duration,
        on_sample: Vec<AbortSignal>,
    ) -> Result<Self> {
        let pool = WorkerPool::new("writer", 1, 1, BackpressurePolicy::Block)?
            .report_panics_to(Arc::clone(&state));
        let abort = pool.abort_signal();
        let handle = pool.submit(move || {
            let mut sink = sink;
            let outcome = drain(&mut sink, &queue, &state, poll_interval, &abort);
            match outcome {
                Ok(SinkStatus::Full) => {
                    info!("Sample of {} lines written, stopping early", sink.lines_written());
                    for signal in &on_sample {
                        signal.abort();
                    }
                }
                Ok(SinkStatus::Open) | Err(PipelineError::Aborted) => {}
                Err(e) => {
                    error!("Writer failed: {e}");
                    state.errors.set(e);
                    return Err(PipelineError::Aborted);
                }
            }
            sink.finish().inspect_err(|e| error!("Writer failed to close output: {e}"))
        })?;
        Ok(Self { pool, handle })
    }

    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.pool.abort_signal()
    }

    /// Waits for the writer to close its output.
    ///
    /// # Errors
    /// Returns the close error, or `Aborted` if the writer stopped on an error
    /// already recorded in the run's error slot.
    pub fn await_termination(self) -> Result<WriteSummary> {
        let summary = self.handle.wait();
        self.pool.shutdown();
        summary
    }
}

fn drain(
    sink: &mut LineSink,
    queue: &BoundedQueue<Vec<String>>,
    state: &PipelineState,
    poll_interval: Duration,
    abort: &AbortSignal,
) -> Result<SinkStatus> {
    loop {
        if abort.is_aborted() {
            return Err(PipelineError::Aborted);
        }
        let finished = state.processing_finished.is_set();
        match queue.poll(poll_interval) {
            Some(lines) => {
                if sink.write_lines(lines)? == SinkStatus::Full {
                    return Ok(SinkStatus::Full);
                }
            }
            None if finished => return Ok(SinkStatus::Open),
            None => {}
        }
    }
}
