//! Core document and settings types
//!
//! This module defines the data structures that represent a test document and
//! the `declarate.yml` settings file.

use crate::commands::Command;
use crate::compare::CompareParams;
use crate::utils::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Session settings (`declarate.yml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Test files or directories run when no paths are given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<String>,

    /// File backing the persistent variable store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_file: Option<String>,

    /// Store every variable persistently
    #[serde(default)]
    pub all_persistent: bool,

    /// Glob patterns of files to leave out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,

    /// Default comparison parameters of the session comparator
    #[serde(default)]
    pub compare: CompareParams,

    /// Base URL prefixed to request paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Variables assigned before any test runs
    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub variables: BTreeMap<String, String>,
}

/// Node-level fields; command fields belong to the builders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeFields {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<serde_yaml::Value>,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub poll: Option<PollConfig>,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub variables: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub variables_persistent: BTreeMap<String, String>,

    /// Explicit command kind
    #[serde(default)]
    pub kind: Option<String>,
}

/// Polling settings of a node
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PollConfig {
    /// Total time to keep polling
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub duration: Option<Duration>,

    /// Wait between attempts (defaults to one second)
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub interval: Option<Duration>,

    /// Keep polling while the response matches this regex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_regexp: Option<String>,

    /// Keep polling while the response matches this JSON template
    #[serde(default, deserialize_with = "deserialize_template")]
    pub response: Option<String>,

    #[serde(default, rename = "comparisonParams")]
    pub comparison_params: CompareParams,
}

impl PollConfig {
    pub fn has_predicate(&self) -> bool {
        self.response_regexp.is_some() || self.response.is_some()
    }
}

/// A parsed node with its commands bound
#[derive(Debug, Default)]
pub struct TestNode {
    /// Display name
    pub name: String,

    /// Nested nodes, run depth-first after the commands
    pub steps: Vec<TestNode>,

    /// Commands in execution order
    pub commands: Vec<Box<dyn Command>>,

    /// Variables extracted from the node's response (name -> JSON path or `*`)
    pub variables: BTreeMap<String, String>,

    /// Same as `variables`, written to the persistent store
    pub variables_persistent: BTreeMap<String, String>,

    pub poll: Option<PollConfig>,

    /// Guard expression; the node is skipped when it is false
    pub condition: Option<String>,
}

impl TestNode {
    /// Whether the node has anything to run
    pub fn is_runnable(&self) -> bool {
        !self.commands.is_empty() || !self.steps.is_empty()
    }
}

/// All nodes of one test file
#[derive(Debug, Default)]
pub struct Document {
    /// File identifier used in results and hooks
    pub file: String,

    pub nodes: Vec<TestNode>,
}

/// Deserialize a mapping of scalars into strings (`a: 1` becomes `"1"`)
pub fn deserialize_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(k, v)| -> Result<(String, String), D::Error> {
                let key = scalar_to_string(k)
                    .ok_or_else(|| D::Error::custom("variable names must be scalars"))?;
                let value = scalar_to_string(v)
                    .ok_or_else(|| D::Error::custom(format!("variable '{}' must be a scalar", key)))?;
                Ok((key, value))
            })
            .collect(),
        _ => Err(D::Error::custom("variables must be a mapping")),
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Deserialize an expected response written as text or as YAML structure.
///
/// Structured values are converted to JSON text.
pub fn deserialize_template<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::Mapping(_) | Value::Sequence(_) => serde_json::to_string(&value)
            .map(Some)
            .map_err(D::Error::custom),
        Value::Tagged(_) => Err(D::Error::custom("tagged values are not supported in responses")),
        scalar => Ok(scalar_to_string(scalar)),
    }
}
