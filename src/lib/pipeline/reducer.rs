//! Two-phase accumulate/reduce over a set of files.
//!
//! Accumulator workers each fold a batch of lines into a fresh partial value
//! and queue it. One reducer thread folds the partials into the running total.
//! Neither phase shares a mutable accumulator between threads.
//!
//! The result is independent of thread count and batch size when `reducer` is
//! associative and commutative and `init` is its identity.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use super::compute::take_batch;
use super::config::PipelineConfig;
use super::monitor::FailFastMonitor;
use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use super::queue::BoundedQueue;
use super::reader::MultiFileReader;
use super::source::SourceSet;
use super::state::{AbortSignal, Abortable, PipelineState};
use crate::errors::{PipelineError, Result};
use crate::logging::OperationTimer;
use crate::progress::ProgressMeter;

type InitFn<Z> = dyn Fn() -> Z + Send + Sync;
type AccumulateFn<Z> = dyn Fn(Z, &str) -> anyhow::Result<Z> + Send + Sync;
type ReduceFn<Z> = dyn Fn(Z, Z) -> Z + Send + Sync;

/// The reduced value and the counts behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<Z> {
    pub value: Z,
    pub lines_read: u64,
    pub files_read: usize,
    pub records_accumulated: u64,
    /// Partial values folded by the reducer.
    pub partials: u64,
    pub elapsed: Duration,
}

/// Folds every line of a [`SourceSet`] into a single value.
pub struct FileReducer<Z> {
    sources: SourceSet,
    init: Arc<InitFn<Z>>,
    accumulator: Arc<AccumulateFn<Z>>,
    reducer: Arc<ReduceFn<Z>>,
    config: PipelineConfig,
}

impl<Z: Send + 'static> FileReducer<Z> {
    /// `init` supplies the starting value for every partial and for the total.
    pub fn new<I, A, R>(
        sources: SourceSet,
        init: I,
        accumulator: A,
        reducer: R,
        config: PipelineConfig,
    ) -> Self
    where
        I: Fn() -> Z + Send + Sync + 'static,
        A: Fn(Z, &str) -> anyhow::Result<Z> + Send + Sync + 'static,
        R: Fn(Z, Z) -> Z + Send + Sync + 'static,
    {
        Self {
            sources,
            init: Arc::new(init),
            accumulator: Arc::new(accumulator),
            reducer: Arc::new(reducer),
            config,
        }
    }

    /// Reads every source and returns the reduced value.
    ///
    /// # Errors
    /// Returns the first read or accumulator error recorded by any stage.
    pub fn run(&self) -> Result<Reduction<Z>> {
        self.config.validate()?;
        let config = &self.config;
        let timer = OperationTimer::new("Reduce", "records");
        info!(
            "Reducing {} file(s) with {} reader(s), {} accumulator thread(s), batch size {}",
            self.sources.len(),
            config.reader_threads(),
            config.threads,
            config.batch_size
        );

        let state = PipelineState::shared();
        let read_queue = Arc::new(BoundedQueue::new(config.read_queue_capacity()));
        let partials = Arc::new(BoundedQueue::new(config.accumulator_queue_capacity()));

        let reader = MultiFileReader::start(
            &self.sources,
            config.reader_threads(),
            Arc::clone(&read_queue),
            Arc::clone(&state),
        )?;
        let accumulate = AccumulateStage::start(self, read_queue, Arc::clone(&partials), &state)?;
        let reduce = ReduceStage::start(self, partials, &state)?;
        let stages: Vec<Box<dyn Abortable>> = vec![
            Box::new(reader.abort_signal()),
            Box::new(accumulate.pool.abort_signal()),
            Box::new(reduce.pool.abort_signal()),
        ];
        let monitor = FailFastMonitor::start(Arc::clone(&state), config.monitor_interval, stages)?;

        let read = reader.await_termination();
        let records_accumulated = accumulate.await_termination(&state);
        let reduced = reduce.await_termination();
        monitor.stop();
        state.check()?;
        let (value, partials) = reduced?;

        timer.log_completion(records_accumulated);
        Ok(Reduction {
            value,
            lines_read: read.lines_read,
            files_read: read.files_read,
            records_accumulated,
            partials,
            elapsed: timer.elapsed(),
        })
    }
}

// ============================================================================
// Accumulate phase
// ============================================================================

struct AccumulateStage {
    pool: WorkerPool,
    handles: Vec<TaskHandle<()>>,
    meter: Arc<ProgressMeter>,
}

impl AccumulateStage {
    fn start<Z: Send + 'static>(
        owner: &FileReducer<Z>,
        read_queue: Arc<BoundedQueue<String>>,
        partials: Arc<BoundedQueue<Z>>,
        state: &Arc<PipelineState>,
    ) -> Result<Self> {
        let threads = owner.config.threads;
        let pool = WorkerPool::new("accumulator", threads, threads, BackpressurePolicy::Block)?
            .report_panics_to(Arc::clone(state));
        let meter = Arc::new(ProgressMeter::new("Accumulated", "records"));
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let worker = Accumulator {
                init: Arc::clone(&owner.init),
                accumulator: Arc::clone(&owner.accumulator),
                batch_size: owner.config.batch_size,
                read_queue: Arc::clone(&read_queue),
                partials: Arc::clone(&partials),
                state: Arc::clone(state),
                meter: Arc::clone(&meter),
                abort: pool.abort_signal(),
                poll_interval: owner.config.poll_interval,
            };
            handles.push(pool.submit(move || worker.run())?);
        }
        Ok(Self { pool, handles, meter })
    }

    /// Waits for every accumulator, then sets `processing_finished`.
    fn await_termination(self, state: &PipelineState) -> u64 {
        for handle in self.handles {
            let _ = handle.wait();
        }
        self.pool.shutdown();
        state.processing_finished.set();
        self.meter.log_final();
        self.meter.count()
    }
}

struct Accumulator<Z> {
    init: Arc<InitFn<Z>>,
    accumulator: Arc<AccumulateFn<Z>>,
    batch_size: usize,
    read_queue: Arc<BoundedQueue<String>>,
    partials: Arc<BoundedQueue<Z>>,
    state: Arc<PipelineState>,
    meter: Arc<ProgressMeter>,
    abort: AbortSignal,
    poll_interval: Duration,
}

impl<Z> Accumulator<Z> {
    fn run(self) -> Result<()> {
        match self.process() {
            Err(e) if !e.is_benign() => {
                error!("Accumulator failed: {e}");
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
            let read_finished = self.state.read_finished.is_set();
            let batch = take_batch(&self.read_queue, self.batch_size, self.poll_interval);
            if batch.is_empty() {
                if read_finished {
                    return Ok(());
                }
                continue;
            }
            let mut partial = (self.init)();
            for line in &batch {
                partial = (self.accumulator)(partial, line.as_str())
                    .map_err(|e| PipelineError::transform("accumulator", e))?;
            }
            self.meter.mark(batch.len() as u64);
            self.partials.put(partial, &self.abort)?;
        }
    }
}

// ============================================================================
// Reduce phase
// ============================================================================

struct ReduceStage<Z> {
    pool: WorkerPool,
    handle: TaskHandle<(Z, u64)>,
}

impl<Z: Send + 'static> ReduceStage<Z> {
    fn start(
        owner: &FileReducer<Z>,
        partials: Arc<BoundedQueue<Z>>,
        state: &Arc<PipelineState>,
    ) -> Result<Self> {
        let pool = WorkerPool::new("reducer", 1, 1, BackpressurePolicy::Block)?
            .report_panics_to(Arc::clone(state));
        let init = Arc::clone(&owner.init);
        let reducer = Arc::clone(&owner.reducer);
        let state = Arc::clone(state);
        let abort = pool.abort_signal();
        let poll_interval = owner.config.poll_interval;
        let handle = pool.submit(move || {
            let mut total = init();
            let mut folded = 0;
            loop {
                if abort.is_aborted() {
                    return Err(PipelineError::Aborted);
                }
                let finished = state.processing_finished.is_set();
                match partials.poll(poll_interval) {
                    Some(partial) => {
                        total = reducer(total, partial);
                        folded += 1;
                    }
                    None if finished => return Ok((total, folded)),
                    None => {}
                }
            }
        })?;
        Ok(Self { pool, handle })
    }

    fn await_termination(self) -> Result<(Z, u64)> {
        let reduced = self.handle.wait();
        self.pool.shutdown();
        reduced
    }
}
