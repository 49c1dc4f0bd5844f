//! `vars`: nodes that only assign variables

use super::{decode, Command, CommandBuilder, CommandEnv};
use crate::config::deserialize_string_map;
use crate::error::{ConfigResult, Result};
use crate::report::{attach, MimeType};
use crate::utils::format_variables;
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;

pub const KIND: &str = "vars";

/// Keys an assignment node may carry besides its variables
const NODE_KEYS: &[&str] = &[
    "name",
    "condition",
    "poll",
    "kind",
    "comparisonParams",
    "variables",
    "variables_persistent",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VarsConfig {
    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub variables: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub variables_persistent: BTreeMap<String, String>,
}

/// Claims nodes made only of node-level keys with at least one variable
pub struct VarsBuilder;

impl CommandBuilder for VarsBuilder {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        let Some(mapping) = node.as_mapping() else {
            return Ok(None);
        };
        let only_node_keys = mapping
            .keys()
            .all(|k| k.as_str().map(|k| NODE_KEYS.contains(&k)).unwrap_or(false));
        if !only_node_keys {
            return Ok(None);
        }

        let config: VarsConfig = decode(KIND, node)?;
        if config.variables.is_empty() && config.variables_persistent.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(VarsCommand::new(config))))
    }
}

#[derive(Debug)]
pub struct VarsCommand {
    config: VarsConfig,
}

impl VarsCommand {
    pub fn new(config: VarsConfig) -> Self {
        VarsCommand { config }
    }
}

impl Command for VarsCommand {
    fn kind(&self) -> &str {
        KIND
    }

    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()> {
        let mut resolved = env.vars.set_all(&self.config.variables)?;
        resolved.extend(env.vars.set_all_persistent(&self.config.variables_persistent)?);
        if !resolved.is_empty() {
            let text = format_variables(&resolved);
            attach(env.report, "variables", MimeType::TextPlain, text.as_bytes());
        }
        Ok(())
    }

    fn response_body(&self) -> Option<&str> {
        None
    }

    fn check(&self, _env: &CommandEnv<'_>) -> Result<()> {
        Ok(())
    }

    fn config(&self) -> &dyn Any {
        &self.config
    }

    fn config_mut(&mut self) -> &mut dyn Any {
        &mut self.config
    }
}
