//! Execution context for a test session
//!
//! The context owns everything a run needs: the variable scope, the
//! comparator, the command builders, the attachment sink and the hooks.
//! One context is built per session and passed to every executor call.

use crate::commands::BuilderRegistry;
use crate::compare::{CompareParams, Comparator};
use crate::eval::Evaluator;
use crate::persistent::{MemoryStore, Persistent};
use crate::report::{EmptyReport, Report};
use crate::runner::{TestWrapper, Variables};
use std::fmt;
use std::rc::Rc;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// Session state threaded through the step executor
pub struct ExecutionContext {
    /// Transient and persistent variables
    pub vars: Variables,

    /// Comparator carrying the session's default parameters
    pub comparator: Comparator,

    /// Builders binding document nodes to commands
    pub builders: BuilderRegistry,

    /// Sink for command attachments
    pub report: Box<dyn Report>,

    /// Instrumentation hooks
    pub wrapper: Option<Box<dyn TestWrapper>>,

    /// Verbosity level
    pub verbosity: Verbosity,
}

impl ExecutionContext {
    /// In-memory persistence, default comparison, default builders
    pub fn new() -> Self {
        Self::from_parts(
            Rc::new(Evaluator::new()),
            Box::new(MemoryStore::new()),
            false,
            CompareParams::default(),
        )
    }

    /// Build a context whose scope and comparator share one evaluator
    pub fn from_parts(
        evaluator: Rc<Evaluator>,
        persistent: Box<dyn Persistent>,
        all_persistent: bool,
        compare_defaults: CompareParams,
    ) -> Self {
        ExecutionContext {
            vars: Variables::new(evaluator.clone(), persistent, all_persistent),
            comparator: Comparator::new(compare_defaults, evaluator),
            builders: BuilderRegistry::default(),
            report: Box::new(EmptyReport),
            wrapper: None,
            verbosity: Verbosity::Normal,
        }
    }

    /// Replace the command builders
    pub fn with_builders(mut self, builders: BuilderRegistry) -> Self {
        self.builders = builders;
        self
    }

    /// Set the attachment sink
    pub fn with_report(mut self, report: Box<dyn Report>) -> Self {
        self.report = report;
        self
    }

    /// Install instrumentation hooks
    pub fn with_wrapper(mut self, wrapper: Box<dyn TestWrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Take the hooks back, e.g. to inspect what they recorded
    pub fn take_wrapper(&mut self) -> Option<Box<dyn TestWrapper>> {
        self.wrapper.take()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("vars", &self.vars)
            .field("builders", &self.builders)
            .field("has_wrapper", &self.wrapper.is_some())
            .field("verbosity", &self.verbosity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::EchoBuilder;

    #[test]
    fn test_context_new() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.verbosity, Verbosity::Normal);
        assert_eq!(ctx.builders.kinds(), vec!["echo", "vars", "shell", "script"]);
        assert!(ctx.wrapper.is_none());
    }

    #[test]
    fn test_vars_and_comparator_share_evaluator() {
        let evaluator = Rc::new(Evaluator::new());
        let ctx = ExecutionContext::from_parts(
            evaluator.clone(),
            Box::new(MemoryStore::new()),
            false,
            CompareParams::default(),
        );
        assert!(Rc::ptr_eq(ctx.vars.evaluator(), &evaluator));
        assert!(Rc::strong_count(&evaluator) >= 3);
    }

    #[test]
    fn test_with_builders() {
        let ctx = ExecutionContext::new()
            .with_builders(BuilderRegistry::empty().with_builder(Box::new(EchoBuilder)));
        assert_eq!(ctx.builders.kinds(), vec!["echo"]);
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(Verbosity::Verbose > Verbosity::Normal);
        assert!(Verbosity::Normal > Verbosity::Quiet);
        assert!(Verbosity::Quiet > Verbosity::Silent);

        let ctx = ExecutionContext::new().with_verbosity(Verbosity::Verbose);
        assert_eq!(ctx.verbosity, Verbosity::Verbose);
    }
}
