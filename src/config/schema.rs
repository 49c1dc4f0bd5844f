//! Document validation
//!
//! Pre-flight checks run before any command executes.

use crate::config::types::{Document, PollConfig, TestNode};
use crate::error::{ConfigError, ConfigResult};
use regex::Regex;

/// Validate every node of a document
pub fn validate_document(document: &Document) -> ConfigResult<()> {
    for node in &document.nodes {
        validate_node(node)?;
    }
    Ok(())
}

/// Validate a node, its commands and its steps
pub fn validate_node(node: &TestNode) -> ConfigResult<()> {
    for command in &node.commands {
        command.is_valid().map_err(|e| in_node(node, e))?;
    }

    if let Some(poll) = &node.poll {
        validate_poll(poll).map_err(|e| in_node(node, e))?;
    }

    for step in &node.steps {
        validate_node(step)?;
    }

    Ok(())
}

/// Validate the polling settings of a node
fn validate_poll(poll: &PollConfig) -> ConfigResult<()> {
    match poll.duration {
        Some(duration) if !duration.is_zero() => {}
        _ => {
            return Err(ConfigError::Invalid(
                "poll duration must be greater than zero".to_string(),
            ))
        }
    }

    if poll.interval.is_some_and(|interval| interval.is_zero()) {
        return Err(ConfigError::Invalid(
            "poll interval must be greater than zero".to_string(),
        ));
    }

    if let Some(pattern) = &poll.response_regexp {
        // Templated patterns are resolved at run time
        if !pattern.contains("{{") {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid poll response_regexp '{}': {}", pattern, e))
            })?;
        }
    }

    Ok(())
}

fn in_node(node: &TestNode, err: ConfigError) -> ConfigError {
    if node.name.is_empty() {
        return err;
    }
    match err {
        ConfigError::Invalid(msg) => ConfigError::Invalid(format!("node '{}': {}", node.name, msg)),
        ConfigError::InvalidCommand { kind, reason } => ConfigError::InvalidCommand {
            kind,
            reason: format!("node '{}': {}", node.name, reason),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::BuilderRegistry;
    use crate::config::parse::parse_document;

    fn validate(yaml: &str) -> ConfigResult<()> {
        let doc = parse_document(yaml, "test.yaml", &BuilderRegistry::default())?;
        validate_document(&doc)
    }

    #[test]
    fn test_valid_document() {
        let yaml = r#"
- name: wait for it
  shell_cmd: echo ready
  poll:
    duration: 2s
    interval: 100ms
    response_regexp: "^pending$"
"#;
        assert!(validate(yaml).is_ok());
    }

    #[test]
    fn test_invalid_command_in_nested_step() {
        let yaml = r#"
- name: outer
  steps:
    - name: inner
      shell:
        cmd: ""
"#;
        let err = validate(yaml).unwrap_err();
        assert!(err.to_string().contains("inner"));
    }

    #[test]
    fn test_poll_requires_duration() {
        let err = validate("- shell_cmd: echo\n  poll:\n    interval: 1s").unwrap_err();
        assert!(err.to_string().contains("duration"));

        assert!(validate("- shell_cmd: echo\n  poll:\n    duration: 1s\n    interval: 0s").is_err());
    }

    #[test]
    fn test_poll_regex_must_compile() {
        let err = validate("- shell_cmd: echo\n  poll:\n    duration: 1s\n    response_regexp: '(open'").unwrap_err();
        assert!(err.to_string().contains("response_regexp"));

        let templated = "- shell_cmd: echo\n  poll:\n    duration: 1s\n    response_regexp: '{{$pattern}}'";
        assert!(validate(templated).is_ok());
    }
}
