//! Multi-file reader stage.
//!
//! A pool of reader threads claims whole files from a [`SourceSet`] and pushes
//! every line onto one shared read queue. No file is read by two threads.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};

use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use super::queue::BoundedQueue;
use super::source::{LineSource, SourceSet};
use super::state::{AbortSignal, PipelineState};
use crate::errors::{PipelineError, Result};
use crate::progress::ProgressMeter;

/// Totals reported once every reader has stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadSummary {
    pub lines_read: u64,
    pub files_read: usize,
    pub read_rate: f64,
    pub elapsed: Duration,
}

/// Running reader pool for one multi-file run.
pub struct MultiFileReader {
    pool: WorkerPool,
    handles: Vec<TaskHandle<u64>>,
    meter: Arc<ProgressMeter>,
    state: Arc<PipelineState>,
}

impl MultiFileReader {
    /// Starts `threads` readers over `sources`, feeding `queue`.
    ///
    /// On the first read failure the error is recorded, `read_finished` is
    /// set, and every reader is aborted.
    ///
    /// # Errors
    /// Returns `Spawn` if a reader thread cannot be started.
    pub fn start(
        sources: &SourceSet,
        threads: usize,
        queue: Arc<BoundedQueue<String>>,
        state: Arc<PipelineState>,
    ) -> Result<Self> {
        // One queued job per file: submission never blocks.
        let pool = WorkerPool::new("reader", threads, sources.len(), BackpressurePolicy::Block)?
            .report_panics_to(Arc::clone(&state));
        let meter = Arc::new(ProgressMeter::new("Read", "lines"));
        let mut handles = Vec::with_capacity(sources.len());
        for path in sources.files() {
            let path = path.clone();
            let queue = Arc::clone(&queue);
            let state = Arc::clone(&state);
            let meter = Arc::clone(&meter);
            let abort = pool.abort_signal();
            handles.push(pool.submit(move || {
                read_file(&path, &queue, &meter, &abort).map_err(|e| {
                    if e.is_benign() {
                        return e;
                    }
                    error!("Reader failed: {e}");
                    state.errors.set(e);
                    state.read_finished.set();
                    abort.abort();
                    PipelineError::Aborted
                })
            })?);
        }
        Ok(Self { pool, handles, meter, state })
    }

    /// Signal that stops every reader within one queue wait.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.pool.abort_signal()
    }

    /// Waits for every reader, then sets `read_finished`.
    pub fn await_termination(self) -> ReadSummary {
        let files_read =
            self.handles.into_iter().map(TaskHandle::wait).filter(Result::is_ok).count();
        self.pool.shutdown();
        self.state.read_finished.set();
        self.meter.log_final();
        ReadSummary {
            lines_read: self.meter.count(),
            files_read,
            read_rate: self.meter.mean_rate(),
            elapsed: self.meter.elapsed(),
        }
    }
}

fn read_file(
    path: &Path,
    queue: &BoundedQueue<String>,
    meter: &ProgressMeter,
    abort: &AbortSignal,
) -> Result<u64> {
    debug!("Reading {}", path.display());
    let mut lines = 0;
    for line in LineSource::open(path)? {
        queue.put(line?, abort)?;
        meter.mark(1);
        lines += 1;
    }
    debug!("Finished {} ({lines} lines)", path.display());
    Ok(lines)
}
