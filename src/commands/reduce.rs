//! Reduce every line of a set of text files to a single value.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fgoxide::io::DelimFile;
use log::info;
use serde::Serialize;

use batchmap_lib::pipeline::{FileReducer, PipelineConfig, Reduction, SourceSet};
use batchmap_lib::validation::validate_output_parent;

use crate::commands::command::Command;
use crate::commands::common::{SourceOptions, ThreadingOptions};

/// Built-in reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reducer {
    /// Number of lines
    Count,
    /// Total characters, excluding line terminators
    Chars,
    /// Number of distinct lines
    Distinct,
}

impl Reducer {
    fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Chars => "chars",
            Self::Distinct => "distinct",
        }
    }

    /// Runs this reduction over `sources`.
    fn reduce(self, sources: SourceSet, config: PipelineConfig) -> Result<Reduction<u64>> {
        let reduction = match self {
            Self::Count => {
                FileReducer::new(sources, || 0_u64, |n, _: &str| Ok(n + 1), |a, b| a + b, config)
                    .run()?
            }
            Self::Chars => FileReducer::new(
                sources,
                || 0_u64,
                |n, line: &str| Ok(n + line.chars().count() as u64),
                |a, b| a + b,
                config,
            )
            .run()?,
            Self::Distinct => {
                let seen = FileReducer::new(
                    sources,
                    HashSet::new,
                    |mut seen: HashSet<String>, line: &str| {
                        seen.insert(line.to_string());
                        Ok(seen)
                    },
                    |mut a, b| {
                        a.extend(b);
                        a
                    },
                    config,
                )
                .run()?;
                Reduction {
                    value: seen.value.len() as u64,
                    lines_read: seen.lines_read,
                    files_read: seen.files_read,
                    records_accumulated: seen.records_accumulated,
                    partials: seen.partials,
                    elapsed: seen.elapsed,
                }
            }
        };
        Ok(reduction)
    }
}

/// One row of the reduce output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReduceMetric {
    pub reducer: String,
    pub value: u64,
    pub lines_read: u64,
    pub files_read: usize,
    pub elapsed_secs: f64,
}

/// Reduce every line of one or more text files to a single value.
#[derive(Debug, Parser)]
#[command(
    name = "reduce",
    about = "\x1b[38;5;30m[MAPPING]\x1b[0m        \x1b[36mReduce every line of a set of files to one value\x1b[0m",
    long_about = r#"
Reduce every line of one or more text files to a single value.

Files are read concurrently. Each accumulator thread folds a batch of lines
into a partial value, and a single reducer thread combines the partials, so
the result does not depend on the thread count or batch size.

Reducers:
  count       number of lines
  chars       total characters, excluding line terminators
  distinct    number of distinct lines

Example usage:
  batchmap reduce -s logs/ --reducer count
  batchmap reduce -s a.txt.gz,b.txt.gz --reducer distinct --output distinct.tsv
"#
)]
pub struct Reduce {
    #[command(flatten)]
    pub input: SourceOptions,

    /// Reduction to compute
    #[arg(short = 'r', long = "reducer", value_enum, default_value_t = Reducer::Count)]
    pub reducer: Reducer,

    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Optional TSV output for the reduced value
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl Command for Reduce {
    fn execute(&self, command_line: &str) -> Result<()> {
        if let Some(output) = &self.output {
            validate_output_parent(output, "output")?;
        }

        info!("Starting Reduce");
        info!("Command line: {command_line}");
        info!("Reducer: {}", self.reducer.name());
        info!("{}", self.threading.log_message());

        let sources = self.input.source_set()?;
        let reduction = self.reducer.reduce(sources, self.threading.to_config())?;
        info!(
            "{} = {} over {} lines in {} file(s)",
            self.reducer.name(),
            reduction.value,
            reduction.lines_read,
            reduction.files_read
        );

        if let Some(output) = &self.output {
            let metric = ReduceMetric {
                reducer: self.reducer.name().to_string(),
                value: reduction.value,
                lines_read: reduction.lines_read,
                files_read: reduction.files_read,
                elapsed_secs: reduction.elapsed.as_secs_f64(),
            };
            DelimFile::default()
                .write_tsv(output, [metric])
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote result to {}", output.display());
        }
        Ok(())
    }
}
