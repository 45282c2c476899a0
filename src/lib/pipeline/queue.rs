//! Fixed-capacity hand-off queue used between every pair of stages.
//!
//! A full queue blocks the producer. Blocking waits are sliced so that a
//! producer or consumer notices its stage's [`AbortSignal`] promptly.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use super::state::AbortSignal;
use crate::errors::{PipelineError, Result};

/// Longest single wait inside a blocking `put` before the abort signal is rechecked.
const PUT_WAIT: Duration = Duration::from_millis(50);

/// A bounded multi-producer multi-consumer queue.
///
/// Both channel ends are held by the queue itself, so it never disconnects
/// while shared; stages signal the end of input through latches instead.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Appends `item`, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns [`PipelineError::Aborted`] if `abort` is raised while waiting.
    pub fn put(&self, item: T, abort: &AbortSignal) -> Result<()> {
        let mut item = item;
        loop {
            if abort.is_aborted() {
                return Err(PipelineError::Aborted);
            }
            match self.tx.send_timeout(item, PUT_WAIT) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => item = returned,
                Err(SendTimeoutError::Disconnected(_)) => return Err(PipelineError::Aborted),
            }
        }
    }

    /// Appends `item` without blocking, handing it back if the queue is full.
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        self.tx.try_send(item).map_err(crossbeam_channel::TrySendError::into_inner)
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    #[must_use]
    pub fn poll(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Moves up to `max` immediately available items into `out`. Never blocks.
    pub fn drain_to(&self, out: &mut Vec<T>, max: usize) -> usize {
        let before = out.len();
        while out.len() - before < max {
            match self.rx.try_recv() {
                Ok(item) => out.push(item),
                Err(_) => break,
            }
        }
        out.len() - before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
