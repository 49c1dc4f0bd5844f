//! `shell`: run a command line through `sh -c`

use super::{check_response, decode, normalize, Command, CommandBuilder, CommandEnv};
use crate::compare::CompareParams;
use crate::config::{deserialize_string_map, deserialize_template};
use crate::error::{CommandError, CommandResult, ConfigError, ConfigResult, Result};
use crate::report::{attach, MimeType};
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;
use std::process::{Command as StdCommand, Stdio};
use tracing::debug;

pub const KIND: &str = "shell";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellConfig {
    pub cmd: String,
    pub response: Option<String>,
    pub comparison_params: CompareParams,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ShortForm {
    #[serde(default)]
    shell_cmd: Option<String>,
    #[serde(default, deserialize_with = "deserialize_template")]
    shell_response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables_to_set: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExtendedForm {
    #[serde(default)]
    shell: Option<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    cmd: String,
    #[serde(default, deserialize_with = "deserialize_template")]
    response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables: BTreeMap<String, String>,
}

pub struct ShellBuilder;

impl CommandBuilder for ShellBuilder {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        let short: ShortForm = decode(KIND, node)?;
        let extended: ExtendedForm = decode(KIND, node)?;

        let short = short.shell_cmd.map(|cmd| ShellConfig {
            cmd,
            response: short.shell_response,
            comparison_params: short.comparison_params,
            variables: short.variables_to_set,
        });
        let extended = extended.shell.map(|section| ShellConfig {
            cmd: section.cmd,
            response: section.response,
            comparison_params: section.comparison_params,
            variables: section.variables,
        });

        Ok(normalize(KIND, short, extended)?
            .map(|config| Box::new(ShellCommand::new(config)) as Box<dyn Command>))
    }
}

#[derive(Debug)]
pub struct ShellCommand {
    config: ShellConfig,
    response: Option<String>,
}

impl ShellCommand {
    pub fn new(config: ShellConfig) -> Self {
        ShellCommand {
            config,
            response: None,
        }
    }
}

impl Command for ShellCommand {
    fn kind(&self) -> &str {
        KIND
    }

    fn is_valid(&self) -> ConfigResult<()> {
        if self.config.cmd.trim().is_empty() {
            return Err(ConfigError::InvalidCommand {
                kind: KIND.to_string(),
                reason: "cmd is empty".to_string(),
            });
        }
        Ok(())
    }

    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()> {
        let cmd = env.vars.apply(&self.config.cmd);
        self.response = None;
        let output = run_process("sh", &["-c", cmd.as_str()])?;
        attach(env.report, "response", MimeType::sniff(&output), output.as_bytes());
        self.response = Some(output);
        Ok(())
    }

    fn response_body(&self) -> Option<&str> {
        self.response.as_deref()
    }

    fn check(&self, env: &CommandEnv<'_>) -> Result<()> {
        check_response(
            env,
            self.config.response.as_deref(),
            self.response.as_deref(),
            &self.config.comparison_params,
        )
    }

    fn variables_to_set(&self) -> Option<&BTreeMap<String, String>> {
        if self.config.variables.is_empty() {
            None
        } else {
            Some(&self.config.variables)
        }
    }

    fn config(&self) -> &dyn Any {
        &self.config
    }

    fn config_mut(&mut self) -> &mut dyn Any {
        &mut self.config
    }
}

/// Run a program to completion and return its stdout without trailing newlines
pub(crate) fn run_process(program: &str, args: &[&str]) -> CommandResult<String> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Executing: {}", command_line);

    let output = StdCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CommandError::Spawn {
            command: command_line.clone(),
            error: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CommandError::ExitStatus {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.trim_end_matches(|c: char| c == '\n' || c == '\r').to_string())
}
