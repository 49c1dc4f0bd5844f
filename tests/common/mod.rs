//! Common test utilities

#![allow(dead_code)]

use declarate::config::{parse_document, validate_document};
use declarate::runner::{ExecutionContext, StepResult};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary directory holding the given files
pub fn create_test_dir(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (name, content) in files {
        write_file(temp_dir.path(), name, content);
    }
    temp_dir
}

/// Write a file, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Parse, validate and run a document with the context's builders
pub fn run_yaml(ctx: &mut ExecutionContext, yaml: &str) -> Vec<StepResult> {
    let mut document = parse_document(yaml, "inline.yaml", &ctx.builders).unwrap();
    validate_document(&document).unwrap();
    ctx.run_document(&mut document)
}

/// Number of lines in a file, 0 when it does not exist
pub fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}
