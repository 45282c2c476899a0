//! Flat-map text files through a built-in line transform.
//!
//! Every input line is turned into zero or more output lines, written to a
//! single destination file. The run's counts and rates are written as a
//! one-row TSV alongside.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use batchmap_lib::pipeline::{
    LineTransform, OrderedFileMapper, RunMetadata, UnorderedFileMapper,
};
use batchmap_lib::validation::validate_output_parent;

use crate::commands::command::Command;
use crate::commands::common::{CompressionOptions, SourceOptions, ThreadingOptions};

/// A per-line transform selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Each line unchanged.
    Identity,
    /// The line's length in characters.
    Length,
    Upper,
    Lower,
    /// One output line per whitespace-separated token.
    Tokens,
    /// Drops lines that are empty or all whitespace.
    NonEmpty,
    /// The Nth tab-separated field, counting from 1.
    TsvColumn(usize),
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "length" => Ok(Self::Length),
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            "tokens" => Ok(Self::Tokens),
            "non-empty" => Ok(Self::NonEmpty),
            other => match other.strip_prefix("tsv-column:").map(str::parse::<usize>) {
                Some(Ok(column)) if column > 0 => Ok(Self::TsvColumn(column)),
                Some(_) => Err(format!("invalid column in '{other}': expected an integer >= 1")),
                None => Err(format!(
                    "unknown transform '{other}': expected one of identity, length, upper, \
                     lower, tokens, non-empty, tsv-column:N"
                )),
            },
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Length => write!(f, "length"),
            Self::Upper => write!(f, "upper"),
            Self::Lower => write!(f, "lower"),
            Self::Tokens => write!(f, "tokens"),
            Self::NonEmpty => write!(f, "non-empty"),
            Self::TsvColumn(column) => write!(f, "tsv-column:{column}"),
        }
    }
}

impl LineTransform for Transform {
    fn apply(&self, line: &str) -> Result<Vec<String>> {
        let out = match self {
            Self::Identity => vec![line.to_string()],
            Self::Length => vec![line.chars().count().to_string()],
            Self::Upper => vec![line.to_uppercase()],
            Self::Lower => vec![line.to_lowercase()],
            Self::Tokens => line.split_whitespace().map(String::from).collect(),
            Self::NonEmpty if line.trim().is_empty() => Vec::new(),
            Self::NonEmpty => vec![line.to_string()],
            Self::TsvColumn(column) => match line.split('\t').nth(column - 1) {
                Some(field) => vec![field.to_string()],
                None => bail!(
                    "line has {} column(s), cannot take column {column}: '{line}'",
                    line.split('\t').count()
                ),
            },
        };
        Ok(out)
    }
}

/// Apply a line transform to every line of one or more text files.
#[derive(Debug, Parser)]
#[command(
    name = "flatmap",
    about = "\x1b[38;5;30m[MAPPING]\x1b[0m        \x1b[36mTransform every line of a set of files\x1b[0m",
    long_about = r#"
Apply a line transform to every line of one or more text files.

Each input line maps to zero or more output lines. By default the output is in
input order: files are read in sorted order and batches are written in the
order they were read, however many threads transform them. With --unordered,
several files are read at once and results are written as they complete,
which is faster but leaves the output order arbitrary.

A destination ending in .gz is gzip-compressed, in parallel when more than one
gzip thread is used. Input files ending in .gz are decompressed.

Transforms:
  identity        each line unchanged
  length          the line's length in characters
  upper, lower    the line in upper or lower case
  tokens          one line per whitespace-separated token
  non-empty       drop blank lines
  tsv-column:N    the Nth tab-separated field (1-based); a shorter line fails the run

The run fails if no lines are written.

Example usage:
  batchmap flatmap -s data/ -d tokens.txt.gz --transform tokens --threads 8
  batchmap flatmap -s a.tsv,b.tsv -d ids.txt --transform tsv-column:1 --unordered
  batchmap flatmap -s big.txt -d head.txt --samples 1000
"#
)]
pub struct FlatMap {
    #[command(flatten)]
    pub input: SourceOptions,

    /// Output file; a .gz suffix selects gzip compression
    #[arg(short = 'd', long = "dest")]
    pub dest: PathBuf,

    /// Transform applied to each line
    #[arg(long = "transform", default_value = "identity")]
    pub transform: Transform,

    /// Write results as they complete instead of in input order
    #[arg(long = "unordered", default_value_t = false)]
    pub unordered: bool,

    /// Stop after writing this many lines
    #[arg(long = "samples")]
    pub samples: Option<u64>,

    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Batches in flight ahead of the writer in ordered mode [default: threads * 4]
    #[arg(long = "queue-length")]
    pub queue_length: Option<usize>,

    #[command(flatten)]
    pub compression: CompressionOptions,

    /// Output file for run metadata
    #[arg(long = "meta-data", default_value = "metadata.tsv")]
    pub meta_data: PathBuf,
}

impl FlatMap {
    fn run_pipeline(&self) -> Result<RunMetadata> {
        let sources = self.input.source_set()?;
        let mut config =
            self.compression.apply(self.threading.to_config()).with_sample(self.samples);
        if let Some(length) = self.queue_length {
            config = config.with_queue_length(length);
        }
        let transform = Arc::new(self.transform);
        let meta = if self.unordered {
            UnorderedFileMapper::new(sources, &self.dest, transform, config).run()
        } else {
            OrderedFileMapper::new(sources, &self.dest, transform, config).run()
        };
        meta.with_context(|| format!("Failed to write {}", self.dest.display()))
    }
}

impl Command for FlatMap {
    fn execute(&self, command_line: &str) -> Result<()> {
        validate_output_parent(&self.meta_data, "meta-data")?;

        info!("Starting FlatMap");
        info!("Command line: {command_line}");
        info!("Sources: {}", self.input.sources.len());
        info!("Destination: {}", self.dest.display());
        info!("Transform: {}", self.transform);
        info!("Mode: {}", if self.unordered { "unordered" } else { "ordered" });
        if let Some(samples) = self.samples {
            info!("Sampling the first {samples} output lines");
        }
        info!("{}", self.threading.log_message());

        let meta = self.run_pipeline()?;
        meta.write_tsv(&self.meta_data)?;
        info!("Read {} lines from {} file(s)", meta.lines_read, meta.files_read);
        info!("Wrote {} lines", meta.lines_written);
        info!("Wrote run metadata to {}", self.meta_data.display());
        Ok(())
    }
}
