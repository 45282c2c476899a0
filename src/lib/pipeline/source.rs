//! Input listing and line readers.
//!
//! A [`SourceSet`] is built from the paths a caller names. Files are taken
//! as given; directories are walked recursively, keeping only files with a
//! recognised text extension, with entries sorted by name at every level.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use fgoxide::io::Io;
use log::debug;

use crate::errors::{PipelineError, Result};
use crate::validation::validate_input_exists;

/// Read buffer for input files.
const BUFFER_SIZE: usize = 1024 * 1024;

/// Extensions picked up when walking a directory, each optionally followed by `.gz`.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["txt", "json", "jsonl", "csv", "tsv"];

/// True if `path` carries one of [`ACCEPTED_EXTENSIONS`], optionally gzipped.
#[must_use]
pub fn has_accepted_extension(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.strip_suffix(".gz").unwrap_or(name);
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

/// An immutable, ordered list of input files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    files: Vec<PathBuf>,
}

impl SourceSet {
    /// Expands `paths` into a file list.
    ///
    /// # Errors
    /// Returns `MissingInput` for a path that does not exist, or `Read` if a
    /// directory cannot be listed.
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            validate_input_exists(path)?;
            if path.is_dir() {
                expand_dir(path, &mut files)?;
            } else {
                files.push(path.to_path_buf());
            }
        }
        debug!("Resolved {} input file(s)", files.len());
        Ok(Self { files })
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn expand_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let read_err = |source| PipelineError::Read { path: dir.to_path_buf(), source };
    let mut entries = fs::read_dir(dir)
        .map_err(read_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(read_err)?;
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            expand_dir(&entry, out)?;
        } else if has_accepted_extension(&entry) {
            out.push(entry);
        }
    }
    Ok(())
}

/// Opens `path` for line reading, decompressing `.gz` input transparently.
///
/// # Errors
/// Returns `Read` if the file cannot be opened.
pub fn open_lines(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    Io::new(5, BUFFER_SIZE)
        .new_reader(path)
        .map_err(|e| PipelineError::Read { path: path.to_path_buf(), source: io::Error::other(e) })
}

/// Iterates the lines of one file, attaching the path to any read error.
pub struct LineSource {
    path: PathBuf,
    lines: io::Lines<Box<dyn BufRead + Send>>,
}

impl LineSource {
    /// # Errors
    /// Returns `Read` if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { path: path.to_path_buf(), lines: open_lines(path)?.lines() })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LineSource {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines
            .next()
            .map(|line| line.map_err(|source| PipelineError::Read { path: self.path.clone(), source }))
    }
}
