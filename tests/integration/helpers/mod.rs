//! Helper utilities for integration tests.

pub mod text_files;

pub use text_files::*;
pub use transforms::*;
