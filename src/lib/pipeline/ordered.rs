//! Order-preserving flat-map over a set of files.
//!
//! A loader thread reads the inputs in order and cuts the line stream into
//! batches. Each batch is submitted to the worker pool and its [`TaskHandle`]
//! is appended to a bounded submission-order queue. The calling thread takes
//! handles off that queue in FIFO order, waits for each, and writes its lines,
//! so output order matches input order whatever order workers finish in. The
//! bounded queue caps how many batches may run ahead of the writer.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use super::compute::{LineTransform, flat_map_batch};
use super::config::PipelineConfig;
use super::metadata::RunMetadata;
use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use super::queue::BoundedQueue;
use super::reader::ReadSummary;
use super::sink::{LineSink, SinkStatus};
use super::source::{LineSource, SourceSet};
use super::state::{AbortSignal, PipelineState};
use crate::errors::{PipelineError, Result, panic_message};
use crate::logging::OperationTimer;
use crate::progress::ProgressMeter;
use crate::validation::validate_output_parent;

type Submissions = BoundedQueue<TaskHandle<Vec<String>>>;

/// Upper bound on the lines reserved up front for one batch.
const MAX_PREALLOCATED_BATCH: usize = 4096;

/// Flat-maps every line of `sources` into `dest`, preserving order.
pub struct OrderedFileMapper<T: ?Sized> {
    sources: SourceSet,
    dest: PathBuf,
    transform: Arc<T>,
    config: PipelineConfig,
}

impl<T: LineTransform + ?Sized + 'static> OrderedFileMapper<T> {
    #[must_use]
    pub fn new(
        sources: SourceSet,
        dest: impl Into<PathBuf>,
        transform: Arc<T>,
        config: PipelineConfig,
    ) -> Self {
        Self { sources, dest: dest.into(), transform, config }
    }

    /// Runs to completion, or until the sample cap is reached.
    ///
    /// # Errors
    /// Returns the first read, transform, or write error, or
    /// [`PipelineError::NoRowsWritten`] if the run produced no output.
    pub fn run(&self) -> Result<RunMetadata> {
        self.config.validate()?;
        validate_output_parent(&self.dest, "dest")?;
        let config = &self.config;
        let timer = OperationTimer::new("Ordered flat-map", "lines");
        info!(
            "Mapping {} file(s) into {} with {} threads, batch size {}, queue length {}",
            self.sources.len(),
            self.dest.display(),
            config.threads,
            config.batch_size,
            config.queue_length()
        );

        let mut sink = LineSink::create(
            &self.dest,
            config.gzip_threads(),
            config.compression_level,
            config.sample,
        )?;
        let state = PipelineState::shared();
        let pool = WorkerPool::new(
            "mapper",
            config.threads,
            config.queue_length(),
            BackpressurePolicy::Block,
        )?;
        let pool = Arc::new(pool.report_panics_to(Arc::clone(&state)));
        let submissions: Arc<Submissions> = Arc::new(BoundedQueue::new(config.queue_length()));
        let processed = Arc::new(ProgressMeter::new("Processed", "records"));
        let loader_abort = AbortSignal::new();

        let loader = Loader {
            sources: self.sources.clone(),
            batch_size: config.batch_size,
            transform: Arc::clone(&self.transform),
            pool: Arc::clone(&pool),
            submissions: Arc::clone(&submissions),
            state: Arc::clone(&state),
            processed: Arc::clone(&processed),
            abort: loader_abort.clone(),
        };
        let loader_state = Arc::clone(&state);
        let loader = thread::Builder::new()
            .name("loader".to_string())
            .spawn(move || guard_loader(&loader_state, move || loader.run()))
            .map_err(|source| PipelineError::Spawn { thread: "loader".to_string(), source })?;

        match consume(&submissions, &mut sink, &state, config.poll_interval) {
            Ok(SinkStatus::Open) => {}
            Ok(SinkStatus::Full) => {
                info!("Sample of {} lines written, stopping early", sink.lines_written());
            }
            Err(e) => {
                state.errors.set(e);
            }
        }
        // Anything still queued or loading is no longer needed.
        loader_abort.abort();
        pool.abort();

        let written = match sink.finish() {
            Ok(summary) => Some(summary),
            Err(e) => {
                state.errors.set(e);
                None
            }
        };
        let read = loader.join().unwrap_or_else(|payload| {
            record_loader_panic(&state, &*payload);
            empty_read_summary()
        });
        pool.shutdown();
        processed.log_final();
        state.check()?;

        let Some(written) = written else {
            return Err(PipelineError::Aborted);
        };
        timer.log_completion(written.lines_written);
        RunMetadata::from_stages(
            &read,
            processed.count(),
            &written,
            timer.elapsed().as_secs_f64(),
        )
        .ensure_rows_written()
    }
}

/// Runs `load` and turns a panic into a recorded error, so the consumer
/// always sees either `read_finished` or an error.
fn guard_loader(state: &PipelineState, load: impl FnOnce() -> ReadSummary) -> ReadSummary {
    panic::catch_unwind(AssertUnwindSafe(load)).unwrap_or_else(|payload| {
        record_loader_panic(state, &*payload);
        state.read_finished.set();
        empty_read_summary()
    })
}

fn record_loader_panic(state: &PipelineState, payload: &(dyn std::any::Any + Send)) {
    let message = panic_message(payload);
    error!("Loader panicked: {message}");
    state.errors.set(PipelineError::Panic { thread: "loader".to_string(), message });
}

fn empty_read_summary() -> ReadSummary {
    ReadSummary { lines_read: 0, files_read: 0, read_rate: 0.0, elapsed: Duration::ZERO }
}

/// Takes handles in submission order and writes their results.
fn consume(
    submissions: &Submissions,
    sink: &mut LineSink,
    state: &PipelineState,
    poll_interval: Duration,
) -> Result<SinkStatus> {
    loop {
        if state.errors.has_error() {
            return Err(PipelineError::Aborted);
        }
        let loading_finished = state.read_finished.is_set();
        match submissions.poll(poll_interval) {
            Some(handle) => {
                if sink.write_lines(handle.wait()?)? == SinkStatus::Full {
                    return Ok(SinkStatus::Full);
                }
            }
            None if loading_finished => return Ok(SinkStatus::Open),
            None => {}
        }
    }
}

struct Loader<T: ?Sized> {
    sources: SourceSet,
    batch_size: usize,
    transform: Arc<T>,
    pool: Arc<WorkerPool>,
    submissions: Arc<Submissions>,
    state: Arc<PipelineState>,
    processed: Arc<ProgressMeter>,
    abort: AbortSignal,
}

impl<T: LineTransform + ?Sized + 'static> Loader<T> {
    fn run(self) -> ReadSummary {
        let meter = ProgressMeter::new("Read", "lines");
        let files_read = match self.load(&meter) {
            Ok(files) => files,
            Err(e) => {
                if !e.is_benign() {
                    error!("Loader failed: {e}");
                    self.state.errors.set(e);
                }
                0
            }
        };
        self.state.read_finished.set();
        meter.log_final();
        ReadSummary {
            lines_read: meter.count(),
            files_read,
            read_rate: meter.mean_rate(),
            elapsed: meter.elapsed(),
        }
    }

    fn load(&self, meter: &ProgressMeter) -> Result<usize> {
        let reserve = self.batch_size.min(MAX_PREALLOCATED_BATCH);
        let mut batch = Vec::with_capacity(reserve);
        let mut files = 0;
        for path in self.sources.files() {
            for line in LineSource::open(path)? {
                if self.abort.is_aborted() {
                    return Err(PipelineError::Aborted);
                }
                batch.push(line?);
                meter.mark(1);
                if batch.len() == self.batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(reserve));
                    self.submit(full)?;
                }
            }
            files += 1;
        }
        if !batch.is_empty() {
            self.submit(batch)?;
        }
        Ok(files)
    }

    fn submit(&self, batch: Vec<String>) -> Result<()> {
        let transform = Arc::clone(&self.transform);
        let state = Arc::clone(&self.state);
        let processed = Arc::clone(&self.processed);
        let handle = self.pool.submit(move || {
            let out = flat_map_batch(&*transform, &batch);
            processed.mark(batch.len() as u64);
            // Record at once so the consumer stops without reaching this batch.
            out.map_err(|e| {
                state.errors.set(e);
                PipelineError::Aborted
            })
        })?;
        self.submissions.put(handle, &self.abort)
    }
}
