//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use batchmap_lib::pipeline::SourceSet;
use batchmap_lib::pipeline::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_COMPRESSION_LEVEL, PipelineConfig, default_threads,
};

/// Input files and directories.
#[derive(Debug, Clone, Args)]
pub struct SourceOptions {
    /// Input files or directories. Repeat the option or separate with commas.
    ///
    /// Directories are searched recursively for .txt, .json, .jsonl, .csv, and
    /// .tsv files, each optionally gzip-compressed.
    #[arg(short = 's', long = "source", required = true, value_delimiter = ',')]
    pub sources: Vec<PathBuf>,
}

impl SourceOptions {
    /// Expands the inputs into the ordered list of files to read.
    ///
    /// # Errors
    ///
    /// Returns an error if an input does not exist or a directory cannot be listed.
    pub fn source_set(&self) -> Result<SourceSet> {
        Ok(SourceSet::new(&self.sources)?)
    }
}

/// Common threading and batching options.
///
/// Every size left unset is derived from `--threads`.
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of compute threads [default: all cores but one]
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Lines handed to a compute thread at once
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Threads reading input files [default: threads / 2.5]
    #[arg(long = "reader-threads")]
    pub reader_threads: Option<usize>,
}

impl ThreadingOptions {
    /// Returns the number of compute threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.threads.unwrap_or_else(default_threads)
    }

    /// Builds a pipeline configuration from these options.
    #[must_use]
    pub fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.num_threads()).with_batch_size(self.batch_size);
        if let Some(readers) = self.reader_threads {
            config = config.with_reader_threads(readers);
        }
        config
    }

    /// Returns a log message describing the threading configuration.
    #[must_use]
    pub fn log_message(&self) -> String {
        let config = self.to_config();
        format!(
            "Using {} compute thread(s), {} reader thread(s), batch size {}",
            config.threads,
            config.reader_threads(),
            config.batch_size
        )
    }
}

/// Options for gzip output.
#[derive(Debug, Clone, Args)]
pub struct CompressionOptions {
    /// Compression level for .gz output (0-9).
    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: u32,

    /// Threads compressing .gz output; 1 selects a single-threaded encoder
    /// [default: threads / 5]
    #[arg(long = "gzip-threads")]
    pub gzip_threads: Option<usize>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { compression_level: DEFAULT_COMPRESSION_LEVEL, gzip_threads: None }
    }
}

impl CompressionOptions {
    /// Applies these options to `config`.
    #[must_use]
    pub fn apply(&self, config: PipelineConfig) -> PipelineConfig {
        let config = config.with_compression_level(self.compression_level);
        match self.gzip_threads {
            Some(threads) => config.with_gzip_threads(threads),
            None => config,
        }
    }
}
