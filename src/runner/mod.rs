//! Test execution engine
//!
//! This module walks parsed documents: variable resolution, node
//! conditions, polling, hooks and the step executor itself.

pub mod context;
pub mod hooks;
pub mod poll;
pub mod step;
pub mod variables;
pub mod when;

// Re-export main types
pub use context::*;
pub use hooks::*;
pub use poll::{PollDecision, PollResult};
pub use step::*;
pub use variables::*;
pub use when::*;
