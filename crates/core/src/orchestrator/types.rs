//! Types for the conversion orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::format::Format;
use crate::workspace::SourceData;

use super::error::ConversionError;

/// Opaque identity of whoever asked for a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to convert one file into `target`.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    source: SourceData,
    file_name: Option<String>,
    declared_format: Option<String>,
    target: Format,
    caller: CallerId,
    submitted_at: DateTime<Utc>,
}

impl ConversionRequest {
    pub fn new(source: SourceData, target: Format, caller: CallerId) -> Self {
        Self {
            source,
            file_name: None,
            declared_format: None,
            target,
            caller,
            submitted_at: Utc::now(),
        }
    }

    /// Request for content held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, target: Format, caller: CallerId) -> Self {
        Self::new(SourceData::Bytes(bytes.into()), target, caller)
    }

    /// Request for a file already on disk.
    pub fn from_path(path: impl Into<PathBuf>, target: Format, caller: CallerId) -> Self {
        Self::new(SourceData::Path(path.into()), target, caller)
    }

    /// Original name of the attachment, used for extension-based detection.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Source format named by the caller; takes precedence over detection.
    pub fn with_declared_format(mut self, format: impl Into<String>) -> Self {
        self.declared_format = Some(format.into());
        self
    }

    pub fn source(&self) -> &SourceData {
        &self.source
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn declared_format(&self) -> Option<&str> {
        self.declared_format.as_deref()
    }

    pub fn target(&self) -> Format {
        self.target
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// A verified conversion output.
///
/// The file lives in the scratch outbox and is removed when this value is
/// dropped, unless it was handed over with [`ConversionOutput::into_reader`].
#[derive(Debug)]
pub struct ConversionOutput {
    path: PathBuf,
    format: Format,
    size_bytes: u64,
    duration_ms: u64,
}

impl ConversionOutput {
    pub fn new(path: PathBuf, format: Format, size_bytes: u64, duration_ms: u64) -> Self {
        Self {
            path,
            format,
            size_bytes,
            duration_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Time from slot acquisition to verified output.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Suggested file name for delivery, `<stem>.<ext>`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.format.extension())
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Opens the output for streaming and unlinks it from the outbox.
    ///
    /// On Unix the open handle stays readable after the unlink. Where that is
    /// not possible the file is left behind for the next start-up sweep.
    pub async fn into_reader(mut self) -> std::io::Result<tokio::fs::File> {
        let path = std::mem::take(&mut self.path);
        let file = tokio::fs::File::open(&path).await;
        if file.is_ok() {
            let _ = tokio::fs::remove_file(&path).await;
        } else {
            self.path = path;
        }
        file
    }
}

impl Drop for ConversionOutput {
    fn drop(&mut self) {
        if !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Outcome of a conversion: a verified output or why there is none.
pub type ConversionResult = Result<ConversionOutput, ConversionError>;
