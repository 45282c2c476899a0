//! Unordered flat-map over a set of files.
//!
//! Stages run concurrently and hand off through two bounded queues:
//!
//! ```text
//! readers (one file each) -> read queue -> compute workers -> write queue -> writer
//! ```
//!
//! The output is a permutation of what the ordered mapper would write. Lines
//! of one input file reach the read queue in file order, but batches from
//! different workers interleave freely.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use super::compute::{ComputeStage, LineTransform};
use super::config::PipelineConfig;
use super::metadata::RunMetadata;
use super::monitor::FailFastMonitor;
use super::queue::BoundedQueue;
use super::reader::MultiFileReader;
use super::sink::{LineSink, SinkWriter};
use super::source::SourceSet;
use super::state::{Abortable, PipelineState};
use crate::errors::Result;
use crate::logging::OperationTimer;
use crate::validation::validate_output_parent;

/// Flat-maps every line of `sources` into `dest` without preserving order.
pub struct UnorderedFileMapper<T: ?Sized> {
    sources: SourceSet,
    dest: PathBuf,
    transform: Arc<T>,
    config: PipelineConfig,
}

impl<T: LineTransform + ?Sized + 'static> UnorderedFileMapper<T> {
    #[must_use]
    pub fn new(
        sources: SourceSet,
        dest: impl Into<PathBuf>,
        transform: Arc<T>,
        config: PipelineConfig,
    ) -> Self {
        Self { sources, dest: dest.into(), transform, config }
    }

    /// Runs every stage to completion.
    ///
    /// # Errors
    /// Returns the first error recorded by any stage, or
    /// [`crate::errors::PipelineError::NoRowsWritten`] if nothing was written.
    pub fn run(&self) -> Result<RunMetadata> {
        self.config.validate()?;
        validate_output_parent(&self.dest, "dest")?;
        let config = &self.config;
        let timer = OperationTimer::new("Unordered flat-map", "lines");
        info!(
            "Mapping {} file(s) into {} with {} reader(s), {} compute thread(s), batch size {}",
            self.sources.len(),
            self.dest.display(),
            config.reader_threads(),
            config.threads,
            config.batch_size
        );

        let sink = LineSink::create(
            &self.dest,
            config.gzip_threads(),
            config.compression_level,
            config.sample,
        )?;
        let state = PipelineState::shared();
        let read_queue = Arc::new(BoundedQueue::new(config.read_queue_capacity()));
        let write_queue = Arc::new(BoundedQueue::new(config.write_queue_capacity()));

        let reader = MultiFileReader::start(
            &self.sources,
            config.reader_threads(),
            Arc::clone(&read_queue),
            Arc::clone(&state),
        )?;
        let compute = ComputeStage::start(
            Arc::clone(&self.transform),
            config.threads,
            config.batch_size,
            read_queue,
            Arc::clone(&write_queue),
            Arc::clone(&state),
            config.poll_interval,
        )?;
        let writer = SinkWriter::start(
            sink,
            write_queue,
            Arc::clone(&state),
            config.poll_interval,
            vec![reader.abort_signal(), compute.abort_signal()],
        )?;
        let stages: Vec<Box<dyn Abortable>> = vec![
            Box::new(reader.abort_signal()),
            Box::new(compute.abort_signal()),
            Box::new(writer.abort_signal()),
        ];
        let monitor = FailFastMonitor::start(Arc::clone(&state), config.monitor_interval, stages)?;

        let read = reader.await_termination();
        let computed = compute.await_termination();
        let written = writer.await_termination();
        monitor.stop();
        state.check()?;
        let written = written?;

        timer.log_completion(written.lines_written);
        RunMetadata::from_stages(
            &read,
            computed.records_processed,
            &written,
            timer.elapsed().as_secs_f64(),
        )
        .ensure_rows_written()
    }
}
