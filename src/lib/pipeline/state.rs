//! Shared run state: cancellation signals, completion latches, and the error slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::errors::{PipelineError, Result};

// ============================================================================
// Cancellation
// ============================================================================

/// Cloneable cancellation flag shared by the threads of one stage.
///
/// Raising it is permanent. Blocking queue operations observe it between
/// timed waits, so an aborted stage unblocks within one poll interval.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Something a run can tear down: a reader pool, a worker pool, a writer.
pub trait Abortable: Send + Sync {
    fn abort(&self);
}

impl Abortable for AbortSignal {
    fn abort(&self) {
        AbortSignal::abort(self);
    }
}

// ============================================================================
// Completion latch
// ============================================================================

/// A monotonic boolean: once set it stays set.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// Error slot
// ============================================================================

/// Holds the first error of a run. Later errors are dropped.
///
/// The flag allows lock-free polling; the mutex is only taken to record or
/// take the error.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    flag: AtomicBool,
    error: Mutex<Option<PipelineError>>,
}

impl ErrorSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` if the slot is empty. Returns true if this call won.
    ///
    /// [`PipelineError::Aborted`] is never recorded.
    pub fn set(&self, error: PipelineError) -> bool {
        if error.is_benign() {
            return false;
        }
        let mut slot = self.error.lock();
        if slot.is_some() {
            debug!("Ignoring error after the first: {error}");
            return false;
        }
        *slot = Some(error);
        self.flag.store(true, Ordering::Release);
        true
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Message of the recorded error, if any.
    #[must_use]
    pub fn describe(&self) -> Option<String> {
        self.error.lock().as_ref().map(ToString::to_string)
    }

    /// Removes the recorded error. The flag stays raised.
    pub fn take(&self) -> Option<PipelineError> {
        self.error.lock().take()
    }
}

// ============================================================================
// Per-run state
// ============================================================================

/// State shared by every stage of one multi-file run: the completion latches
/// and the error slot. The queues live beside it so each stage only holds the
/// ends it needs.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Set once every reader has finished or been aborted.
    pub read_finished: Latch,
    /// Set once reading has finished and the read queue is drained.
    pub processing_finished: Latch,
    pub errors: ErrorSlot,
}

impl PipelineState {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Releases every stage waiting on a completion latch.
    pub fn finish_all(&self) {
        self.read_finished.set();
        self.processing_finished.set();
    }

    /// Surfaces the run's recorded error, if any.
    ///
    /// # Errors
    /// Returns the first error recorded by any stage.
    pub fn check(&self) -> Result<()> {
        self.errors.take().map_or(Ok(()), Err)
    }
}
