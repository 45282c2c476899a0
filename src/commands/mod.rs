//! CLI command implementations for batchmap.
//!
//! Each submodule implements one subcommand.
//!
//! - [`flatmap`] - Transform every line of a set of files into one output file
//! - [`reduce`] - Reduce every line of a set of files to a single value

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod flatmap;
pub mod reduce;
