//! Instrumentation hooks around node execution

use crate::commands::Command;
use crate::runner::{StepResult, Variables};
use std::collections::BTreeMap;

/// Mutable view of a node handed to hooks.
///
/// Hooks may rewrite the pending commands (through `Command::config_mut`) or
/// the variable scope before the node runs.
pub struct NodeView<'a> {
    pub name: &'a str,
    pub vars: &'a mut Variables,
    /// Variables the node extracts from its response
    pub variables: &'a BTreeMap<String, String>,
    pub commands: &'a mut Vec<Box<dyn Command>>,
}

/// Callbacks fired by the step executor.
///
/// `*_test` fire once per node, `*_test_step` once per execution of the
/// node's commands (so once per poll attempt).
pub trait TestWrapper {
    fn before_test(&mut self, file: &str, node: &mut NodeView<'_>, level: usize) {
        let _ = (file, node, level);
    }

    fn after_test(&mut self, file: &str, node: &mut NodeView<'_>, result: &StepResult) {
        let _ = (file, node, result);
    }

    fn before_test_step(&mut self, file: &str, node: &mut NodeView<'_>, level: usize) {
        let _ = (file, node, level);
    }

    /// `polling` is set when the attempt belongs to a poll schedule
    fn after_test_step(&mut self, file: &str, node: &mut NodeView<'_>, result: &StepResult, polling: bool) {
        let _ = (file, node, result, polling);
    }
}
