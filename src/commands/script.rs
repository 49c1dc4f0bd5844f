//! `script`: run a script file through `sh`

use super::shell::run_process;
use super::{check_response, decode, normalize, Command, CommandBuilder, CommandEnv};
use crate::compare::CompareParams;
use crate::config::{deserialize_string_map, deserialize_template};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::report::{attach, MimeType};
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;

pub const KIND: &str = "script";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptConfig {
    pub path: String,
    pub response: Option<String>,
    pub comparison_params: CompareParams,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ShortForm {
    #[serde(default)]
    script_path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_template")]
    script_response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables_to_set: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExtendedForm {
    #[serde(default)]
    script: Option<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    path: String,
    #[serde(default, deserialize_with = "deserialize_template")]
    response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables: BTreeMap<String, String>,
}

pub struct ScriptBuilder;

impl CommandBuilder for ScriptBuilder {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        let short: ShortForm = decode(KIND, node)?;
        let extended: ExtendedForm = decode(KIND, node)?;

        let short = short.script_path.map(|path| ScriptConfig {
            path,
            response: short.script_response,
            comparison_params: short.comparison_params,
            variables: short.variables_to_set,
        });
        let extended = extended.script.map(|section| ScriptConfig {
            path: section.path,
            response: section.response,
            comparison_params: section.comparison_params,
            variables: section.variables,
        });

        Ok(normalize(KIND, short, extended)?
            .map(|config| Box::new(ScriptCommand::new(config)) as Box<dyn Command>))
    }
}

#[derive(Debug)]
pub struct ScriptCommand {
    config: ScriptConfig,
    response: Option<String>,
}

impl ScriptCommand {
    pub fn new(config: ScriptConfig) -> Self {
        ScriptCommand {
            config,
            response: None,
        }
    }
}

impl Command for ScriptCommand {
    fn kind(&self) -> &str {
        KIND
    }

    /// Templated paths can only be checked at run time
    fn is_valid(&self) -> ConfigResult<()> {
        let path = &self.config.path;
        if path.trim().is_empty() {
            return Err(ConfigError::InvalidCommand {
                kind: KIND.to_string(),
                reason: "path is empty".to_string(),
            });
        }
        let templated = path.contains("{{") || path.contains("$(");
        if !templated && !Path::new(path).is_file() {
            return Err(ConfigError::InvalidCommand {
                kind: KIND.to_string(),
                reason: format!("script '{}' does not exist", path),
            });
        }
        Ok(())
    }

    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()> {
        let path = env.vars.apply(&self.config.path);
        self.response = None;
        let output = run_process("sh", &[path.as_str()])?;
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
