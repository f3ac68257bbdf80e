//! Error types for workspace management.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing, inspecting or releasing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The scratch root cannot be created or written to.
    #[error("Scratch root {} is not writable: {source}", path.display())]
    NotWritable { path: PathBuf, source: io::Error },

    /// The job's directory already exists.
    #[error("Workspace {} already exists", path.display())]
    Collision { path: PathBuf },

    /// The tool left no non-empty file with the expected extension.
    #[error("No non-empty .{extension} output was produced")]
    MissingOutput { extension: String },

    /// Filesystem operation failed.
    #[error("Workspace I/O failed at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
