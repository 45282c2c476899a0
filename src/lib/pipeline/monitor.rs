//! Fail-fast monitor.
//!
//! One thread per run wakes every interval and inspects the error slot. On
//! the first error it aborts every registered stage and sets both completion
//! latches so nothing stays blocked waiting for input that will never come.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use log::{debug, error};

use super::state::{Abortable, PipelineState};
use crate::errors::{PipelineError, Result};

/// Handle to a running monitor thread. Stopping or dropping it ends the thread.
pub struct FailFastMonitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FailFastMonitor {
    /// Starts watching `state`, aborting `stages` on the first recorded error.
    ///
    /// # Errors
    /// Returns `Spawn` if the thread cannot be started.
    pub fn start(
        state: Arc<PipelineState>,
        interval: Duration,
        stages: Vec<Box<dyn Abortable>>,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!("Monitor stopped");
                            return;
                        }
                    }
                    if state.errors.has_error() {
                        let cause = state.errors.describe().unwrap_or_default();
                        error!("Aborting run after error: {cause}");
                        for stage in &stages {
                            stage.abort();
                        }
                        state.finish_all();
                        return;
                    }
                }
            })
            .map_err(|source| PipelineError::Spawn { thread: "monitor".to_string(), source })?;
        Ok(Self { stop: Some(stop_tx), handle: Some(handle) })
    }

    /// Stops the monitor and waits for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Monitor thread terminated abnormally");
            }
        }
    }
}

impl Drop for FailFastMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
