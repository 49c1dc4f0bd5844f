//! Document parsing and validation
//!
//! This module parses test documents and `declarate.yml` settings files
//! and validates documents before they run.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
