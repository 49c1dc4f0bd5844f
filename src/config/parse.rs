//! Document parsing and settings discovery

use crate::commands::{vars, BuilderRegistry};
use crate::config::types::{Document, NodeFields, Settings, TestNode};
use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value as Yaml;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file names to search for
const SETTINGS_FILE_NAMES: &[&str] = &["declarate.yml", "declarate.yaml"];

/// Find the settings file by searching current and parent directories
pub fn find_settings_file() -> ConfigResult<PathBuf> {
    find_settings_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the settings file starting from a specific directory
pub fn find_settings_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in SETTINGS_FILE_NAMES {
            let settings_path = current_dir.join(file_name);
            searched_paths.push(settings_path.display().to_string());

            if settings_path.is_file() {
                return Ok(settings_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse settings from a string
pub fn parse_settings(yaml: &str, file: &str) -> ConfigResult<Settings> {
    if yaml.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
        file: file.to_string(),
        error: e.to_string(),
    })
}

pub fn parse_settings_file(path: &Path) -> ConfigResult<Settings> {
    let file = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        file: file.clone(),
        error: e.to_string(),
    })?;
    parse_settings(&contents, &file)
}

/// Load the given settings file, or discover one. No file means defaults.
pub fn load_settings(explicit: Option<&Path>) -> ConfigResult<(Settings, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((parse_settings_file(path)?, Some(path.to_path_buf())));
    }
    match find_settings_file() {
        Ok(path) => {
            debug!("Using settings file {}", path.display());
            Ok((parse_settings_file(&path)?, Some(path)))
        }
        Err(ConfigError::NotFound(_)) => Ok((Settings::default(), None)),
        Err(e) => Err(e),
    }
}

/// Parse a test document, binding commands with `builders`
pub fn parse_document(yaml: &str, file: &str, builders: &BuilderRegistry) -> ConfigResult<Document> {
    let entries: Vec<Yaml> = if yaml.trim().is_empty() {
        Vec::new()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            file: file.to_string(),
            error: e.to_string(),
        })?
    };

    let mut nodes = Vec::new();
    for entry in &entries {
        let node = build_node(entry, file, builders)?;
        if node.is_runnable() {
            nodes.push(node);
        } else {
            debug!("Ignoring node '{}' in {}: nothing to run", node.name, file);
        }
    }

    Ok(Document {
        file: file.to_string(),
        nodes,
    })
}

pub fn parse_document_file(path: &Path, builders: &BuilderRegistry) -> ConfigResult<Document> {
    let file = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        file: file.clone(),
        error: e.to_string(),
    })?;
    parse_document(&contents, &file, builders)
}

/// Build one node and its steps
fn build_node(value: &Yaml, file: &str, builders: &BuilderRegistry) -> ConfigResult<TestNode> {
    if !value.is_mapping() {
        return Err(ConfigError::Parse {
            file: file.to_string(),
            error: format!("test node must be a mapping, got {}", describe(value)),
        });
    }

    let fields: NodeFields = serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Parse {
        file: file.to_string(),
        error: e.to_string(),
    })?;

    let mut node = TestNode {
        name: fields.name,
        steps: fields
            .steps
            .iter()
            .map(|step| build_node(step, file, builders))
            .collect::<ConfigResult<Vec<_>>>()?,
        commands: Vec::new(),
        variables: fields.variables,
        variables_persistent: fields.variables_persistent,
        poll: fields.poll,
        condition: fields.condition,
    };

    if let Some(command) = builders.build(value)? {
        // Assignment nodes hand their variables over to the command
        if command.kind() == vars::KIND {
            node.variables.clear();
            node.variables_persistent.clear();
        }
        node.commands.push(command);
    }

    Ok(node)
}

fn describe(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "a boolean",
        Yaml::Number(_) => "a number",
        Yaml::String(_) => "a string",
        Yaml::Sequence(_) => "a sequence",
        Yaml::Mapping(_) => "a mapping",
        Yaml::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<Document> {
        parse_document(yaml, "test.yaml", &BuilderRegistry::default())
    }

    #[test]
    fn test_parse_simple_document() {
        let yaml = r#"
- name: hello
  shell_cmd: echo hello
  shell_response: hello
- name: nested
  steps:
    - name: first
      echo_message: one
    - name: second
      echo:
        message: two
"#;
        let doc = parse(yaml).unwrap();
        assert_eq!(doc.file, "test.yaml");
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].commands[0].kind(), "shell");
        assert_eq!(doc.nodes[1].steps.len(), 2);
        assert_eq!(doc.nodes[1].steps[1].commands[0].kind(), "echo");
    }

    #[test]
    fn test_assignment_node_becomes_vars_command() {
        let yaml = r#"
- name: setup
  variables:
    a: 1
"#;
        let doc = parse(yaml).unwrap();
        let node = &doc.nodes[0];
        assert_eq!(node.commands[0].kind(), "vars");
        assert!(node.variables.is_empty());
    }

    #[test]
    fn test_node_variables_stay_with_command_nodes() {
        let yaml = r#"
- name: fetch
  shell_cmd: "echo '{\"id\": 3}'"
  variables:
    id: id
"#;
        let doc = parse(yaml).unwrap();
        assert_eq!(doc.nodes[0].commands[0].kind(), "shell");
        assert_eq!(doc.nodes[0].variables["id"], "id");
    }

    #[test]
    fn test_empty_nodes_are_ignored() {
        let doc = parse("- name: nothing\n- name: also nothing\n  condition: 'true'").unwrap();
        assert!(doc.nodes.is_empty());
        assert!(parse("").unwrap().nodes.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("name: not a list"), Err(ConfigError::Parse { .. })));
        assert!(matches!(parse("- just a string"), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            parse("- shell_cmd: a\n  echo_message: b"),
            Err(ConfigError::AmbiguousCommand { .. })
        ));
    }

    #[test]
    fn test_find_settings_in_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("declarate.yml");
        fs::write(&settings_path, "tests: [tests]\n").unwrap();

        let found = find_settings_file_from(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(found, settings_path);
    }

    #[test]
    fn test_find_settings_in_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("declarate.yaml");
        let sub_dir = temp_dir.path().join("subdir");

        fs::create_dir(&sub_dir).unwrap();
        fs::write(&settings_path, "all_persistent: true\n").unwrap();

        let found = find_settings_file_from(sub_dir).unwrap();
        assert_eq!(found, settings_path);

        let settings = parse_settings_file(&found).unwrap();
        assert!(settings.all_persistent);
    }

    #[test]
    fn test_settings_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = find_settings_file_from(temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_parse_settings_variables_and_compare() {
        let yaml = r#"
host: http://localhost:8080
variables:
  host: localhost
compare:
  ignoreArraysOrdering: true
skip:
  - "**/wip_*.yaml"
"#;
        let settings = parse_settings(yaml, "declarate.yml").unwrap();
        assert_eq!(settings.variables["host"], "localhost");
        assert_eq!(settings.compare.ignore_arrays_ordering, Some(true));
        assert_eq!(settings.skip, vec!["**/wip_*.yaml"]);
        assert_eq!(settings.host.as_deref(), Some("http://localhost:8080"));
    }
}
