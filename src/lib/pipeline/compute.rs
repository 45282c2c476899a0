//! The compute stage: applying a line transform to batches.

use std::sync::Arc;
use std::time::Duration;

use log::error;

use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use super::queue::BoundedQueue;
use super::state::{AbortSignal, PipelineState};
use crate::errors::{PipelineError, Result};
use crate::progress::ProgressMeter;

/// Maps one input line to zero or more output lines.
///
/// Closures of the right shape implement it directly:
///
/// ```
/// use batchmap_lib::pipeline::LineTransform;
///
/// let length = |line: &str| -> anyhow::Result<Vec<String>> { Ok(vec![line.len().to_string()]) };
/// assert_eq!(length.apply("ccc").unwrap(), vec!["3"]);
/// ```
pub trait LineTransform: Send + Sync {
    /// # Errors
    /// Any error fails the whole run.
    fn apply(&self, line: &str) -> anyhow::Result<Vec<String>>;
}

impl<F> LineTransform for F
where
    F: Fn(&str) -> anyhow::Result<Vec<String>> + Send + Sync,
{
    fn apply(&self, line: &str) -> anyhow::Result<Vec<String>> {
        self(line)
    }
}

/// Applies `transform` to each line of `batch`, concatenating the outputs in order.
///
/// A single-line batch returns the transform's output as is.
///
/// # Errors
/// Returns `Transform` wrapping the first failure.
pub fn flat_map_batch<T>(transform: &T, batch: &[String]) -> Result<Vec<String>>
where
    T: LineTransform + ?Sized,
{
    let apply = |line: &str| {
        transform.apply(line).map_err(|e| PipelineError::transform("transform", e))
    };
    if let [line] = batch {
        return apply(line.as_str());
    }
    let mut out = Vec::with_capacity(batch.len());
    for line in batch {
        out.extend(apply(line.as_str())?);
    }
    Ok(out)
}

/// Takes up to `max` lines from `queue`: waits up to `wait` for the first, then
/// drains whatever else is immediately available.
pub(crate) fn take_batch(
    queue: &BoundedQueue<String>,
    max: usize,
    wait: Duration,
) -> Vec<String> {
    let mut batch = Vec::new();
    if let Some(first) = queue.poll(wait) {
        batch.push(first);
        queue.drain_to(&mut batch, max.saturating_sub(1));
    }
    batch
}

/// Totals reported once every compute worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeSummary {
    pub records_processed: u64,
    pub processing_rate: f64,
}

/// Compute workers for an unordered run.
///
/// Each worker pulls batches off the read queue and pushes non-empty result
/// batches onto the write queue, until reading has finished and the read
/// queue is empty.
pub struct ComputeStage {
    pool: WorkerPool,
    handles: Vec<TaskHandle<()>>,
    meter: Arc<ProgressMeter>,
    state: Arc<PipelineState>,
}

impl ComputeStage {
    /// # Errors
    /// Returns `Spawn` if a worker thread cannot be started.
    pub fn start<T>(
        transform: Arc<T>,
        threads: usize,
        batch_size: usize,
        read_queue: Arc<BoundedQueue<String>>,
        write_queue: Arc<BoundedQueue<Vec<String>>>,
        state: Arc<PipelineState>,
        poll_interval: Duration,
    ) -> Result<Self>
    where
        T: LineTransform + ?Sized + 'static,
    {
        let threads = threads.max(1);
        let pool = WorkerPool::new("compute", threads, threads, BackpressurePolicy::Block)?
            .report_panics_to(Arc::clone(&state));
        let meter = Arc::new(ProgressMeter::new("Processed", "records"));
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let worker = Worker {
                transform: Arc::clone(&transform),
                batch_size,
                read_queue: Arc::clone(&read_queue),
                write_queue: Arc::clone(&write_queue),
                state: Arc::clone(&state),
                meter: Arc::clone(&meter),
                abort: pool.abort_signal(),
                poll_interval,
            };
            handles.push(pool.submit(move || worker.run())?);
        }
        Ok(Self { pool, handles, meter, state })
    }

    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.pool.abort_signal()
    }

    /// Waits for every worker, then sets `processing_finished`.
    pub fn await_termination(self) -> ComputeSummary {
        for handle in self.handles {
            // Failures were recorded in the error slot by the worker.
            let _ = handle.wait();
        }
        self.pool.shutdown();
        self.state.processing_finished.set();
        self.meter.log_final();
        ComputeSummary {
            records_processed: self.meter.count(),
            processing_rate: self.meter.mean_rate(),
        }
    }
}

struct Worker<T: ?Sized> {
    transform: Arc<T>,
    batch_size: usize,
    read_queue: Arc<BoundedQueue<String>>,
    write_queue: Arc<BoundedQueue<Vec<String>>>,
    state: Arc<PipelineState>,
    meter: Arc<ProgressMeter>,
    abort: AbortSignal,
    poll_interval: Duration,
}

impl<T: LineTransform + ?Sized> Worker<T> {
    fn run(self) -> Result<()> {
        match self.process() {
            Err(e) if !e.is_benign() => {
                error!("Compute worker failed: {e}");
                self.state.errors.set(e);
                self.state.processing_finished.set();
                Err(PipelineError::Aborted)
            }
            other => other,
        }
    }

    fn process(&self) -> Result<()> {
        loop {
            if self.abort.is_aborted() {
                return Err(PipelineError::Aborted);
            }
            // Read before draining: once set, an empty queue stays empty.
            let read_finished = self.state.read_finished.is_set();
            let batch = take_batch(&self.read_queue, self.batch_size, self.poll_interval);
            if batch.is_empty() {
                if read_finished {
                    return Ok(());
                }
                continue;
            }
            self.meter.mark(batch.len() as u64);
            let results = flat_map_batch(&*self.transform, &batch)?;
            if !results.is_empty() {
                self.write_queue.put(results, &self.abort)?;
            }
        }
    }
}
