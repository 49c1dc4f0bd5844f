//! Command contract and builder registry
//!
//! A command is the unit of work bound to a document node. Builders inspect the
//! raw YAML of a node and produce at most one command for it.

pub mod echo;
pub mod request;
pub mod script;
pub mod shell;
pub mod vars;

pub use echo::{EchoBuilder, EchoCommand, EchoConfig};
pub use request::{RequestBuilder, RequestCommand, RequestConfig};
pub use script::{ScriptBuilder, ScriptCommand, ScriptConfig};
pub use shell::{ShellBuilder, ShellCommand, ShellConfig};
pub use vars::{VarsBuilder, VarsCommand, VarsConfig};

use crate::compare::{to_test_error, CompareParams, Comparator};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::report::Report;
use crate::runner::Variables;
use serde::de::DeserializeOwned;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// What a command sees while it runs
pub struct CommandEnv<'a> {
    pub vars: &'a mut Variables,
    pub report: &'a dyn Report,
    pub comparator: &'a Comparator,
}

/// A unit of work bound to a node
pub trait Command: fmt::Debug {
    /// Builder kind that produced this command
    fn kind(&self) -> &str;

    /// Pre-flight validation, without side effects
    fn is_valid(&self) -> ConfigResult<()> {
        Ok(())
    }

    /// Perform the work. Templates are resolved on every call, so a command
    /// may be executed repeatedly (polling).
    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()>;

    /// Response captured by the last `execute`
    fn response_body(&self) -> Option<&str>;

    /// Assert on the captured response
    fn check(&self, env: &CommandEnv<'_>) -> Result<()>;

    /// Command-level variable bindings (name -> JSON path or `*`)
    fn variables_to_set(&self) -> Option<&BTreeMap<String, String>> {
        None
    }

    /// Normalised configuration, for hooks to inspect or rewrite
    fn config(&self) -> &dyn Any;

    fn config_mut(&mut self) -> &mut dyn Any;
}

/// Produces commands from raw node YAML
pub trait CommandBuilder {
    fn kind(&self) -> &str;

    /// `Ok(None)` when the node does not carry this builder's fields
    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>>;
}

/// Builders consulted for every node, in registration order
pub struct BuilderRegistry {
    builders: Vec<Box<dyn CommandBuilder>>,
}

impl BuilderRegistry {
    pub fn empty() -> Self {
        BuilderRegistry {
            builders: Vec::new(),
        }
    }

    pub fn with_builder(mut self, builder: Box<dyn CommandBuilder>) -> Self {
        self.register(builder);
        self
    }

    pub fn register(&mut self, builder: Box<dyn CommandBuilder>) {
        self.builders.push(builder);
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.builders.iter().map(|b| b.kind()).collect()
    }

    /// Bind the node to a command.
    ///
    /// With an explicit `kind` only that builder is asked. Otherwise every
    /// builder is asked and two claims are an error.
    pub fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        if let Some(kind) = node.get("kind").and_then(Yaml::as_str) {
            let builder = self
                .builders
                .iter()
                .find(|b| b.kind() == kind)
                .ok_or_else(|| ConfigError::UnknownCommandKind(kind.to_string()))?;
            return match builder.build(node)? {
                Some(command) => Ok(Some(command)),
                None => Err(ConfigError::KindNotClaimed(kind.to_string())),
            };
        }

        let mut claimed: Option<Box<dyn Command>> = None;
        for builder in &self.builders {
            if let Some(command) = builder.build(node)? {
                if let Some(first) = &claimed {
                    return Err(ConfigError::AmbiguousCommand {
                        first: first.kind().to_string(),
                        second: command.kind().to_string(),
                    });
                }
                claimed = Some(command);
            }
        }
        Ok(claimed)
    }
}

impl BuilderRegistry {
    /// The built-in commands, with `host` prefixed to request paths
    pub fn with_host(host: &str) -> Self {
        BuilderRegistry::empty()
            .with_builder(Box::new(EchoBuilder))
            .with_builder(Box::new(VarsBuilder))
            .with_builder(Box::new(ShellBuilder))
            .with_builder(Box::new(ScriptBuilder))
            .with_builder(Box::new(RequestBuilder::new(host)))
    }
}

impl Default for BuilderRegistry {
    /// echo, vars, shell, script, request
    fn default() -> Self {
        BuilderRegistry::with_host("")
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Deserialize one of a builder's views of the node
pub(crate) fn decode<T: DeserializeOwned>(kind: &str, node: &Yaml) -> ConfigResult<T> {
    serde_yaml::from_value(node.clone()).map_err(|e| ConfigError::InvalidCommand {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Pick between the short (`shell_cmd`) and extended (`shell: {cmd}`) forms
pub(crate) fn normalize<T>(kind: &str, short: Option<T>, extended: Option<T>) -> ConfigResult<Option<T>> {
    match (short, extended) {
        (Some(_), Some(_)) => Err(ConfigError::InvalidCommand {
            kind: kind.to_string(),
            reason: "both the short and the extended form are given".to_string(),
        }),
        (short, extended) => Ok(short.or(extended)),
    }
}

/// Compare a resolved expected response against the captured one
pub(crate) fn check_response(
    env: &CommandEnv<'_>,
    expected: Option<&str>,
    actual: Option<&str>,
    params: &CompareParams,
) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let expected = env.vars.apply(expected);
    let actual = actual.unwrap_or_default();

    let errors = env.comparator.compare_text(&expected, actual, params)?;
    match to_test_error("response body differs", &expected, actual, &errors) {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
