//! Durable variable storage

use crate::error::{VariableError, VariableResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key-value store for variables that outlive a single run
pub trait Persistent {
    fn set(&mut self, key: &str, value: &str) -> VariableResult<()>;

    /// Returns `None` when the key has never been set
    fn get(&self, key: &str) -> VariableResult<Option<String>>;

    fn reset(&mut self) -> VariableResult<()>;
}

/// In-memory store, used for dry runs and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistent for MemoryStore {
    fn set(&mut self, key: &str, value: &str) -> VariableResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> VariableResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn reset(&mut self) -> VariableResult<()> {
        self.values.clear();
        Ok(())
    }
}

/// JSON file store. Every `set` rewrites the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when `clean` is set
    pub fn open(path: impl Into<PathBuf>, clean: bool) -> VariableResult<Self> {
        let mut store = FileStore {
            path: path.into(),
            values: BTreeMap::new(),
        };

        if clean {
            store.reset()?;
        } else if store.path.exists() {
            let content = fs::read_to_string(&store.path).map_err(|e| persistence(&store.path, e))?;
            if !content.trim().is_empty() {
                store.values = serde_json::from_str(&content).map_err(|e| persistence(&store.path, e))?;
            }
        }

        debug!(
            "Opened persistent store {} with {} values",
            store.path.display(),
            store.values.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> VariableResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| persistence(&self.path, e))?;
            }
        }
        let content = serde_json::to_string_pretty(&self.values).map_err(|e| persistence(&self.path, e))?;
        fs::write(&self.path, content).map_err(|e| persistence(&self.path, e))
    }
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> VariableError {
    VariableError::Persistence(format!("{}: {}", path.display(), err))
}

impl Persistent for FileStore {
    fn set(&mut self, key: &str, value: &str) -> VariableResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn get(&self, key: &str) -> VariableResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn reset(&mut self) -> VariableResult<()> {
        self.values.clear();
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| persistence(&self.path, e))?;
        }
        Ok(())
    }
}
