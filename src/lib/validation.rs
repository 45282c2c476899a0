//! Parameter and path validation.
//!
//! All checks return [`PipelineError`] variants so callers get the offending name
//! or path in the message.

use std::fmt::Display;
use std::path::Path;

use crate::errors::{PipelineError, Result};

/// Validate that an input path (file or directory) exists
///
/// # Errors
/// Returns [`PipelineError::MissingInput`] if the path does not exist
///
/// # Example
/// ```
/// use batchmap_lib::validation::validate_input_exists;
///
/// assert!(validate_input_exists("/nonexistent/part-0000.txt").is_err());
/// ```
pub fn validate_input_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::MissingInput { path: path.to_path_buf() });
    }
    Ok(())
}

/// Validate that the directory an output file will be created in exists
///
/// # Errors
/// Returns [`PipelineError::InvalidParameter`] naming `name` if the parent is missing
pub fn validate_output_parent<P: AsRef<Path>>(path: P, name: &str) -> Result<()> {
    let path = path.as_ref();
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(PipelineError::InvalidParameter {
                parameter: name.to_string(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            })
        }
        _ => Ok(()),
    }
}

/// Validate that a numeric parameter is positive
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use batchmap_lib::validation::validate_positive;
///
/// validate_positive(500, "batch-size").unwrap();
/// assert!(validate_positive(0, "batch-size").is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(PipelineError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}
