//! Declarate - a declarative YAML test runner
//!
//! Test documents describe trees of steps. Each step runs a command, checks
//! its response with a structural comparator and passes variables on to the
//! steps that follow. Steps may poll until a condition holds.

// Public modules
pub mod cli;
pub mod commands;
pub mod compare;
pub mod config;
pub mod error;
pub mod eval;
pub mod persistent;
pub mod report;
pub mod runner;
pub mod suite;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use error::{DeclarateError, Result};

/// Current version of Declarate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
