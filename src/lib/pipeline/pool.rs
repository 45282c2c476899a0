//! Fixed-size worker pool with a bounded job queue.
//!
//! Every submission returns a [`TaskHandle`], a single-assignment slot that
//! resolves to the task's result, its error, or [`PipelineError::Aborted`] if
//! the pool was aborted before the task ran. What happens when the job queue
//! is full is chosen per pool by [`BackpressurePolicy`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use log::{debug, error};
use parking_lot::Mutex;

use super::state::{AbortSignal, Abortable, PipelineState};
use crate::errors::{PipelineError, Result, panic_message};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Longest single wait inside a blocking submit before the abort signal is rechecked.
const SUBMIT_WAIT: Duration = Duration::from_millis(50);

/// What `submit` does when the job queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Block the submitting thread until a slot frees up.
    Block,
    /// Run the task on the submitting thread.
    CallerRuns,
}

// ============================================================================
// Task handle
// ============================================================================

/// Handle to one submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has completed.
    ///
    /// # Errors
    /// Returns the task's own error, a [`PipelineError::Panic`] if it panicked,
    /// or [`PipelineError::Aborted`] if it was discarded unrun.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(PipelineError::Aborted))
    }

    /// True once the result is available.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.rx.is_empty()
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// A fixed set of named threads executing submitted tasks in FIFO order.
pub struct WorkerPool {
    name: String,
    policy: BackpressurePolicy,
    jobs: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    abort: AbortSignal,
    panics_to: Option<Arc<PipelineState>>,
}

impl WorkerPool {
    /// Starts `threads` workers (minimum 1) behind a job queue of `queue_capacity`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Spawn`] if a thread cannot be started.
    pub fn new(
        name: &str,
        threads: usize,
        queue_capacity: usize,
        policy: BackpressurePolicy,
    ) -> Result<Self> {
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));
        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let thread_name = format!("{name}-{i}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .map_err(|source| PipelineError::Spawn { thread: thread_name, source })?;
            workers.push(handle);
        }
        debug!("Started pool '{name}' with {} threads ({policy:?})", workers.len());
        Ok(Self {
            name: name.to_string(),
            policy,
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            abort: AbortSignal::new(),
            panics_to: None,
        })
    }

    /// Records panics in `state`'s error slot instead of returning them
    /// through the task's handle, which then resolves to `Aborted`.
    #[must_use]
    pub fn report_panics_to(mut self, state: Arc<PipelineState>) -> Self {
        self.panics_to = Some(state);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pool's cancellation flag, for long-running tasks to poll.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Submits a task. Panics inside the task are caught and reported as errors.
    ///
    /// # Errors
    /// Returns [`PipelineError::Aborted`] if the pool is aborted or shut down.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.abort.is_aborted() {
            return Err(PipelineError::Aborted);
        }
        let Some(sender) = self.jobs.lock().clone() else {
            return Err(PipelineError::Aborted);
        };

        let (tx, rx) = bounded(1);
        let abort = self.abort.clone();
        let pool_name = self.name.clone();
        let panics_to = self.panics_to.clone();
        let mut job: Job = Box::new(move || {
            if abort.is_aborted() {
                return;
            }
            let outcome = catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                let thread = thread::current().name().unwrap_or(&pool_name).to_string();
                let message = panic_message(&*payload);
                error!("Task on '{thread}' panicked: {message}");
                let panic = PipelineError::Panic { thread, message };
                match &panics_to {
                    Some(state) => {
                        state.errors.set(panic);
                        Err(PipelineError::Aborted)
                    }
                    None => Err(panic),
                }
            });
            // The handle may already be gone if its consumer stopped early.
            let _ = tx.send(outcome);
        });

        match self.policy {
            BackpressurePolicy::Block => loop {
                if self.abort.is_aborted() {
                    return Err(PipelineError::Aborted);
                }
                match sender.send_timeout(job, SUBMIT_WAIT) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(returned)) => job = returned,
                    Err(SendTimeoutError::Disconnected(_)) => return Err(PipelineError::Aborted),
                }
            },
            BackpressurePolicy::CallerRuns => match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => job(),
                Err(TrySendError::Disconnected(_)) => return Err(PipelineError::Aborted),
            },
        }
        Ok(TaskHandle { rx })
    }

    /// Discards queued tasks and refuses new ones. Running tasks finish, and
    /// long-running ones stop at their next check of [`Self::abort_signal`].
    pub fn abort(&self) {
        if !self.abort.is_aborted() {
            debug!("Aborting pool '{}'", self.name);
        }
        self.abort.abort();
    }

    /// Stops accepting tasks, lets queued tasks run, and joins every worker.
    pub fn shutdown(&self) {
        drop(self.jobs.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                error!("Worker in pool '{}' terminated abnormally", self.name);
            }
        }
    }
}

impl Abortable for WorkerPool {
    fn abort(&self) {
        WorkerPool::abort(self);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
