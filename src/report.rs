//! Attachment sinks for command output

use crate::error::ReportError;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    TextPlain,
    ApplicationJson,
}

impl MimeType {
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::TextPlain => "txt",
            MimeType::ApplicationJson => "json",
        }
    }

    /// Plain text unless the content parses as JSON
    pub fn sniff(content: &str) -> MimeType {
        if serde_json::from_str::<serde_json::Value>(content).is_ok() {
            MimeType::ApplicationJson
        } else {
            MimeType::TextPlain
        }
    }
}

pub trait Report {
    fn add_attachment(&self, name: &str, mime: MimeType, content: &[u8]) -> Result<(), ReportError>;
}

/// Attach `content`, logging instead of failing when the sink errors
pub fn attach(report: &dyn Report, name: &str, mime: MimeType, content: &[u8]) {
    if let Err(err) = report.add_attachment(name, mime, content) {
        warn!("Failed to add attachment: {}", err);
    }
}

/// Discards every attachment
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyReport;

impl Report for EmptyReport {
    fn add_attachment(&self, _name: &str, _mime: MimeType, _content: &[u8]) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Writes attachments as numbered files (`0001-response.txt`) into a directory
#[derive(Debug)]
pub struct DirReport {
    dir: PathBuf,
    counter: Cell<usize>,
}

impl DirReport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirReport {
            dir: dir.into(),
            counter: Cell::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Report for DirReport {
    fn add_attachment(&self, name: &str, mime: MimeType, content: &[u8]) -> Result<(), ReportError> {
        let write_err = |error: std::io::Error| ReportError::Write {
            name: name.to_string(),
            error: error.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let index = self.counter.get() + 1;
        self.counter.set(index);

        let safe_name: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let file = self
            .dir
            .join(format!("{:04}-{}.{}", index, safe_name, mime.extension()));
        fs::write(file, content).map_err(write_err)
    }
}
