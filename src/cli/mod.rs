//! CLI interface and argument parsing
//!
//! This module builds the command line, loads settings and drives a suite run.

pub mod app;

// Re-export main types
pub use app::*;
