//! Error types for pipeline runs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boxed error produced by a caller-supplied function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// An input path that does not exist
    #[error("Input path '{}' does not exist", path.display())]
    MissingInput {
        /// The missing path
        path: PathBuf,
    },

    /// Failure opening or reading an input file
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        /// The input being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failure creating or writing the output file
    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        /// The output being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A caller-supplied transform, accumulator, or reducer failed
    #[error("{stage} failed: {source}")]
    Transform {
        /// Which stage invoked the function
        stage: &'static str,
        /// The error returned by the function
        #[source]
        source: BoxError,
    },

    /// A worker thread panicked
    #[error("Thread '{thread}' panicked: {message}")]
    Panic {
        /// Name of the thread that panicked
        thread: String,
        /// The panic payload, if it was a string
        message: String,
    },

    /// The OS refused to start a pipeline thread
    #[error("Failed to spawn thread '{thread}': {source}")]
    Spawn {
        /// Name the thread would have had
        thread: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Work was cancelled because the run is being torn down
    #[error("Pipeline aborted")]
    Aborted,

    /// The run finished without producing any output
    #[error("No rows have been written.")]
    NoRowsWritten,
}

impl PipelineError {
    /// Wraps an error returned by a caller-supplied function.
    pub fn transform(stage: &'static str, error: anyhow::Error) -> Self {
        Self::Transform { stage, source: error.into() }
    }

    /// True for cancellation, which is expected once an abort is under way.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
