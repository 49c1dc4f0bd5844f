//! Step executor
//!
//! Walks a document depth-first. For each node: check the condition, run the
//! commands, run the nested steps, extract the node's variables, and repeat
//! the whole body on a poll schedule when the node polls.

use crate::commands::CommandEnv;
use crate::config::{self, Document, PollConfig, TestNode};
use crate::error::{as_test_error, DeclarateError, Result, TestError};
use crate::runner::poll::{self, PollDecision, PollResult};
use crate::runner::{is_true, ExecutionContext, NodeView};
use serde_json::Value as Json;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one node
#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub file: String,
    /// Nesting level, 0 for document entries
    pub level: usize,
    pub skipped: bool,
    /// Shared with the failing step when a child failure propagates
    pub error: Option<Rc<DeclarateError>>,
    /// Captured response, or the aggregate of the steps' responses
    pub response: Option<String>,
    pub poll: Option<PollResult>,
    /// The poll predicate stopped a failing attempt
    pub poll_condition_failed: bool,
    /// Results of the nested steps that ran in the last attempt
    pub steps: Vec<StepResult>,
}

impl StepResult {
    pub fn new(name: &str, file: &str, level: usize) -> Self {
        StepResult {
            name: name.to_string(),
            file: file.to_string(),
            level,
            skipped: false,
            error: None,
            response: None,
            poll: None,
            poll_condition_failed: false,
            steps: Vec::new(),
        }
    }

    pub fn status(&self) -> StepStatus {
        if self.skipped {
            StepStatus::Skipped
        } else if self.error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Passed
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status() == StepStatus::Failed
    }

    pub fn fail(&mut self, err: DeclarateError) {
        self.error = Some(Rc::new(err));
    }

    /// Structured assertion behind the failure, if any
    pub fn test_error(&self) -> Option<&TestError> {
        self.error.as_deref().and_then(as_test_error)
    }

    /// Deepest failing step, or this result
    pub fn failed_step(&self) -> &StepResult {
        self.steps
            .iter()
            .find(|step| step.is_failed())
            .map(|step| step.failed_step())
            .unwrap_or(self)
    }
}

enum Hook<'r> {
    BeforeTest(usize),
    AfterTest(&'r StepResult),
    BeforeStep(usize),
    AfterStep(&'r StepResult, bool),
}

type CommandsOutcome = std::result::Result<Option<String>, (DeclarateError, Option<String>)>;

impl ExecutionContext {
    /// Parse and validate a file without running it
    pub fn load(&self, path: &Path) -> Result<Document> {
        let document = config::parse_document_file(path, &self.builders)?;
        config::validate_document(&document)?;
        Ok(document)
    }

    /// Parse, validate and run a file
    pub fn run_file(&mut self, path: &Path) -> Result<Vec<StepResult>> {
        let mut document = self.load(path)?;
        Ok(self.run_document(&mut document))
    }

    /// Run every node of a document. A failing node does not stop the next one.
    pub fn run_document(&mut self, document: &mut Document) -> Vec<StepResult> {
        let file = document.file.clone();
        document
            .nodes
            .iter_mut()
            .map(|node| self.run_node(&file, node, 0, false))
            .collect()
    }

    /// Run one node with its condition, hooks and poll schedule
    pub fn run_node(&mut self, file: &str, node: &mut TestNode, level: usize, polling: bool) -> StepResult {
        if let Some(condition) = &node.condition {
            if !is_true(&self.vars, condition) {
                info!("skipped {}:{} (condition is false)", file, node.name);
                let mut result = StepResult::new(&node.name, file, level);
                result.skipped = true;
                return result;
            }
        }

        self.fire(file, node, Hook::BeforeTest(level));
        if !node.name.is_empty() {
            info!("start {}:{}", file, node.name);
        }

        let poll_config = node.poll.clone();
        let schedule = poll_config.as_ref().map(poll::schedule_for).unwrap_or_default();
        let result = match poll_config {
            Some(config) if !schedule.is_empty() => self.run_polling(file, node, level, &config, &schedule),
            _ => self.run_body(file, node, level, polling),
        };

        match &result.error {
            None => info!("passed {}:{}", file, node.name),
            Some(err) if polling => debug!("failed {}:{} (polling): {}", file, node.name, err),
            Some(err) => error!("failed {}:{}: {}", file, node.name, err),
        }

        self.fire(file, node, Hook::AfterTest(&result));
        result
    }

    fn run_polling(
        &mut self,
        file: &str,
        node: &mut TestNode,
        level: usize,
        config: &PollConfig,
        schedule: &[Duration],
    ) -> StepResult {
        let start = Instant::now();
        let planned_finish = start + schedule.iter().sum::<Duration>();
        let mut attempts = 0;
        let mut last: Option<StepResult> = None;

        for (i, wait) in schedule.iter().enumerate() {
            attempts = i + 1;
            let mut attempt = self.run_body(file, node, level, true);
            let failed = attempt.is_failed();
            let decision = poll::decide(config, failed, attempt.response.as_deref(), &self.vars, &self.comparator);

            match decision {
                PollDecision::Continue => {
                    last = Some(attempt);
                    if attempts < schedule.len() {
                        debug!("poll {}:{}, wait {:?}", file, node.name, wait);
                        thread::sleep(*wait);
                    }
                }
                PollDecision::Stop => {
                    if failed && config.has_predicate() {
                        attempt.poll_condition_failed = true;
                    }
                    last = Some(attempt);
                    break;
                }
                PollDecision::StopWithMismatch(mismatch) => {
                    if failed {
                        attempt.fail(mismatch.into());
                        attempt.poll_condition_failed = true;
                    }
                    last = Some(attempt);
                    break;
                }
            }
        }

        let mut result = last.unwrap_or_else(|| StepResult::new(&node.name, file, level));
        result.poll = Some(PollResult {
            start,
            planned_finish,
            finish: Instant::now(),
            attempts,
        });
        result
    }

    /// One execution of the node's commands and steps
    fn run_body(&mut self, file: &str, node: &mut TestNode, level: usize, polling: bool) -> StepResult {
        let mut result = StepResult::new(&node.name, file, level);
        self.fire(file, node, Hook::BeforeStep(level));

        match self.run_commands(node) {
            Ok(response) => result.response = response,
            Err((err, response)) => {
                result.response = response;
                result.fail(err);
                self.fire(file, node, Hook::AfterStep(&result, polling));
                return result;
            }
        }

        let mut deferred = None;
        if !node.steps.is_empty() {
            let mut responses = Vec::new();
            for step in node.steps.iter_mut() {
                let child = self.run_node(file, step, level + 1, polling);
                if !child.skipped {
                    responses.push(child.response.clone().unwrap_or_default());
                }
                let failure = child.error.clone();
                result.steps.push(child);

                if let Some(err) = failure {
                    if !polling {
                        result.error = Some(err);
                        break;
                    }
                    // The rest of the iteration still runs
                    deferred.get_or_insert(err);
                }
            }
            if !responses.is_empty() {
                result.response = Some(join_responses(&responses));
            }
        }

        if result.error.is_none() {
            if let Err(err) = self.extract_node_variables(node, result.response.as_deref()) {
                result.fail(err);
            }
            if let Some(err) = deferred {
                result.error = Some(err);
            }
        }

        self.fire(file, node, Hook::AfterStep(&result, polling));
        result
    }

    fn run_commands(&mut self, node: &mut TestNode) -> CommandsOutcome {
        let mut response = None;
        for command in node.commands.iter_mut() {
            let mut env = CommandEnv {
                vars: &mut self.vars,
                report: self.report.as_ref(),
                comparator: &self.comparator,
            };
            debug!("Running {} command of '{}'", command.kind(), node.name);

            if let Err(err) = command.execute(&mut env) {
                return Err((err, None));
            }
            let body = command.response_body().map(str::to_string);
            if let Err(err) = command.check(&env) {
                return Err((err, body));
            }

            if let (Some(text), Some(mapping)) = (body.as_deref(), command.variables_to_set()) {
                if let Err(err) = env.vars.extract(mapping, text, false) {
                    return Err((err.into(), Some(text.to_string())));
                }
            }
            response = body;
        }
        Ok(response)
    }

    fn extract_node_variables(&mut self, node: &TestNode, response: Option<&str>) -> Result<()> {
        if node.variables.is_empty() && node.variables_persistent.is_empty() {
            return Ok(());
        }
        let body = response.unwrap_or_default();
        self.vars.extract(&node.variables, body, false)?;
        self.vars.extract(&node.variables_persistent, body, true)?;
        Ok(())
    }

    fn fire(&mut self, file: &str, node: &mut TestNode, hook: Hook<'_>) {
        let Some(wrapper) = self.wrapper.as_mut() else {
            return;
        };
        let mut view = NodeView {
            name: &node.name,
            vars: &mut self.vars,
            variables: &node.variables,
            commands: &mut node.commands,
        };
        match hook {
            Hook::BeforeTest(level) => wrapper.before_test(file, &mut view, level),
            Hook::AfterTest(result) => wrapper.after_test(file, &mut view, result),
            Hook::BeforeStep(level) => wrapper.before_test_step(file, &mut view, level),
            Hook::AfterStep(result, polling) => wrapper.after_test_step(file, &mut view, result, polling),
        }
    }
}

/// Join step responses into a JSON array; non-JSON responses become strings
fn join_responses(responses: &[String]) -> String {
    let items = responses
        .iter()
        .map(|text| serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.clone())))
        .collect();
    Json::Array(items).to_string()
}
