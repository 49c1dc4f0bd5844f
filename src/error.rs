//! Error types for Declarate

use std::io;
use thiserror::Error;

/// Result type alias for Declarate operations
pub type Result<T> = std::result::Result<T, DeclarateError>;

/// Main error type for Declarate
#[derive(Error, Debug)]
pub enum DeclarateError {
    /// Document parsing and validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A command failed to execute
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// An assertion produced by the comparator
    #[error("{0}")]
    Test(#[from] TestError),

    /// Variable extraction and persistence errors
    #[error("Variable error: {0}")]
    Variable(#[from] VariableError),

    /// Expression evaluation errors
    #[error("Expression error: {0}")]
    Eval(#[from] EvalError),

    /// Attachment sink errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find settings file (searched: {0})")]
    NotFound(String),

    #[error("Failed to parse {file}: {error}")]
    Parse { file: String, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown command kind '{0}'")]
    UnknownCommandKind(String),

    #[error("Node declares kind '{0}' but has none of its fields")]
    KindNotClaimed(String),

    #[error("Node is claimed by both '{first}' and '{second}' commands, set 'kind' to disambiguate")]
    AmbiguousCommand { first: String, second: String },

    #[error("Invalid {kind} command: {reason}")]
    InvalidCommand { kind: String, reason: String },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

/// Command execution errors (adapter or IO level)
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("Command exited with code {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Request to '{url}' failed: {error}")]
    Request { url: String, error: String },

    #[error("{0}")]
    Failed(String),
}

/// Structured assertion failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct TestError {
    pub title: String,
    pub expected: String,
    pub actual: String,
    pub message: String,
}

impl TestError {
    pub fn new(
        title: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TestError {
            title: title.into(),
            expected: expected.into(),
            actual: actual.into(),
            message: message.into(),
        }
    }
}

/// Variable extraction and storage errors
#[derive(Error, Debug)]
pub enum VariableError {
    #[error("path '{path}' doesn't exist in given json {body}")]
    PathNotFound { path: String, body: String },

    #[error("Persistent storage error: {0}")]
    Persistence(String),
}

/// Expression lexing, parsing and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("function '{name}': {reason}")]
    Function { name: String, reason: String },
}

/// Attachment sink errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write attachment '{name}': {error}")]
    Write { name: String, error: String },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for command operations
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Specialized result type for variable operations
pub type VariableResult<T> = std::result::Result<T, VariableError>;

/// Specialized result type for expression evaluation
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Returns the structured assertion behind an error, if there is one
pub fn as_test_error(err: &DeclarateError) -> Option<&TestError> {
    match err {
        DeclarateError::Test(test_err) => Some(test_err),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_not_found_names_path_and_body() {
        let err = VariableError::PathNotFound {
            path: "data.missing".to_string(),
            body: r#"{"data":{}}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("data.missing"));
        assert!(msg.contains(r#"{"data":{}}"#));
    }

    #[test]
    fn test_as_test_error() {
        let err: DeclarateError = TestError::new("title", "a", "b", "differs").into();
        assert_eq!(as_test_error(&err).map(|e| e.title.as_str()), Some("title"));

        let err: DeclarateError = CommandError::Failed("boom".to_string()).into();
        assert!(as_test_error(&err).is_none());
    }
}
