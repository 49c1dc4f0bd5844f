//! Suite orchestration
//!
//! Collects test files, validates all of them up front, then runs them one
//! after another through a single execution context.

use crate::config::Document;
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::{ExecutionContext, StepResult, StepStatus};
use glob::glob;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSIONS: &[&str] = &["yaml", "yml"];

/// What a suite run covers
#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    /// Files, directories or glob patterns
    pub paths: Vec<PathBuf>,

    /// Glob patterns of files to leave out
    pub skip: Vec<String>,

    /// Parse and validate only
    pub dry_run: bool,

    /// Clear the persistent store before running
    pub reset_persistent: bool,

    /// Variables assigned before the first file runs
    pub variables: BTreeMap<String, String>,
}

/// Outcome of a suite run
#[derive(Debug, Default)]
pub struct SuiteSummary {
    pub files: Vec<PathBuf>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Results of every document entry, in run order
    pub results: Vec<StepResult>,
}

impl SuiteSummary {
    fn record(&mut self, result: StepResult) {
        match result.status() {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Suite {
    ctx: ExecutionContext,
    options: SuiteOptions,
}

impl Suite {
    pub fn new(ctx: ExecutionContext, options: SuiteOptions) -> Self {
        Suite { ctx, options }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    /// Run the suite. Parse and validation errors abort before any node runs.
    pub fn run(&mut self) -> Result<SuiteSummary> {
        let files = collect_files(&self.options.paths, &self.options.skip)?;
        info!("Collected {} test file(s)", files.len());

        let mut documents = files
            .iter()
            .map(|file| self.ctx.load(file))
            .collect::<Result<Vec<Document>>>()?;

        let mut summary = SuiteSummary {
            files,
            ..Default::default()
        };
        if self.options.dry_run {
            return Ok(summary);
        }

        self.ctx.vars.reset();
        if self.options.reset_persistent {
            debug!("Clearing persistent variables");
            self.ctx.vars.reset_persistent()?;
        }
        self.ctx.vars.set_all(&self.options.variables)?;

        for document in documents.iter_mut() {
            info!("Running {}", document.file);
            for result in self.ctx.run_document(document) {
                summary.record(result);
            }
        }
        Ok(summary)
    }
}

/// Expand paths into a sorted list of test files.
///
/// Directories are searched recursively for `.yaml`/`.yml` files; other
/// paths are taken as files or glob patterns.
pub fn collect_files(paths: &[PathBuf], skip: &[String]) -> ConfigResult<Vec<PathBuf>> {
    let skip = compile_globset(skip)?;
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for ext in EXTENSIONS {
                let pattern = path.join("**").join(format!("*.{}", ext));
                files.extend(expand(&pattern.to_string_lossy())?);
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            let matched = expand(&path.to_string_lossy())?;
            if matched.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "test path '{}' does not exist",
                    path.display()
                )));
            }
            files.extend(matched);
        }
    }

    files.retain(|file| {
        let skipped = skip.is_match(file);
        if skipped {
            debug!("Skipping {}", file.display());
        }
        !skipped
    });
    files.sort();
    files.dedup();
    Ok(files)
}

fn expand(pattern: &str) -> ConfigResult<Vec<PathBuf>> {
    let entries = glob(pattern)
        .map_err(|e| ConfigError::Invalid(format!("invalid test path pattern {:?}: {}", pattern, e)))?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file() && has_test_extension(path))
        .collect())
}

fn has_test_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn compile_globset(patterns: &[String]) -> ConfigResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| ConfigError::Invalid(format!("invalid skip glob {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("invalid skip globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_collect_files_from_directory() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.yaml", "[]");
        let b = write(dir.path(), "nested/b.yml", "[]");
        write(dir.path(), "notes.txt", "not a test");

        let files = collect_files(&[dir.path().to_path_buf()], &[]).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn test_collect_files_skip_globs() {
        let dir = TempDir::new().unwrap();
        let keep = write(dir.path(), "keep.yaml", "[]");
        write(dir.path(), "wip_feature.yaml", "[]");

        let files = collect_files(&[dir.path().to_path_buf()], &["**/wip_*".to_string()]).unwrap();
        assert_eq!(files, vec![keep]);
    }

    #[test]
    fn test_collect_missing_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(collect_files(&[missing], &[]).is_err());
    }

    #[test]
    fn test_invalid_file_aborts_before_running() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        write(
            dir.path(),
            "a_first.yaml",
            &format!("- name: touch\n  shell_cmd: touch {}\n", marker.display()),
        );
        write(dir.path(), "b_broken.yaml", "- name: broken\n  shell:\n    cmd: ''\n");

        let options = SuiteOptions {
            paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let mut suite = Suite::new(ExecutionContext::new(), options);
        assert!(suite.run().is_err());
        assert!(!marker.exists());
    }

    #[test]
    fn test_summary_counts() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "suite.yaml",
            r#"
- name: passes
  echo_message: "{{$greeting}}"
  echo_response: hello
- name: fails
  echo_message: one
  echo_response: two
- name: skipped
  condition: "false"
  echo_message: never
"#,
        );

        let options = SuiteOptions {
            paths: vec![dir.path().to_path_buf()],
            variables: [("greeting".to_string(), "hello".to_string())].into(),
            ..Default::default()
        };
        let mut suite = Suite::new(ExecutionContext::new(), options);
        let summary = suite.run().unwrap();
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
        assert!(!summary.success());
        assert_eq!(summary.failures().next().unwrap().name, "fails");
    }

    #[test]
    fn test_dry_run_executes_nothing() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        write(
            dir.path(),
            "touch.yaml",
            &format!("- name: touch\n  shell_cmd: touch {}\n", marker.display()),
        );

        let options = SuiteOptions {
            paths: vec![dir.path().to_path_buf()],
            dry_run: true,
            ..Default::default()
        };
        let summary = Suite::new(ExecutionContext::new(), options).run().unwrap();
        assert_eq!(summary.files.len(), 1);
        assert!(summary.results.is_empty());
        assert!(!marker.exists());
    }
}
