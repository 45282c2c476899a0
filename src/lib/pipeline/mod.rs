//! Concurrent line-oriented file processing.
//!
//! Three engines share the same primitives:
//!
//! - [`OrderedFileMapper`] applies a [`LineTransform`] to every input line and
//!   writes the results in input order.
//! - [`UnorderedFileMapper`] does the same with independent reader, compute,
//!   and writer pools, and makes no ordering promise.
//! - [`FileReducer`] folds every line into one value.
//!
//! Stages hand off through [`BoundedQueue`]s, so memory stays bounded and a
//! slow consumer throttles its producers. The first error from any thread is
//! latched in the run's [`PipelineState`]; every other stage is then aborted
//! and the error returned to the caller once all threads have stopped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchmap_lib::pipeline::{OrderedFileMapper, PipelineConfig, SourceSet};
//!
//! # fn main() -> batchmap_lib::errors::Result<()> {
//! let upper = Arc::new(|line: &str| -> anyhow::Result<Vec<String>> {
//!     Ok(vec![line.to_uppercase()])
//! });
//! let sources = SourceSet::new(&["input.txt"])?;
//! let meta = OrderedFileMapper::new(sources, "output.txt.gz", upper, PipelineConfig::new(4))
//!     .run()?;
//! println!("wrote {} lines", meta.lines_written);
//! # Ok(())
//! # }
//! ```

pub mod compute;
pub mod config;
pub mod gzip;
pub mod metadata;
pub mod monitor;
pub mod ordered;
pub mod pool;
pub mod queue;
pub mod reader;
pub mod reducer;
pub mod sink;
pub mod source;
pub mod state;
pub mod unordered;

pub use compute::{ComputeStage, ComputeSummary, LineTransform, flat_map_batch};
pub use config::PipelineConfig;
pub use metadata::RunMetadata;
pub use monitor::FailFastMonitor;
pub use ordered::OrderedFileMapper;
pub use pool::{BackpressurePolicy, TaskHandle, WorkerPool};
pub use queue::BoundedQueue;
pub use reader::{MultiFileReader, ReadSummary};
pub use reducer::{FileReducer, Reduction};
pub use sink::{LineSink, SinkStatus, SinkWriter, WriteSummary};
pub use source::{LineSource, SourceSet};
pub use state::{AbortSignal, Abortable, ErrorSlot, Latch, PipelineState};
pub use unordered::UnorderedFileMapper;
