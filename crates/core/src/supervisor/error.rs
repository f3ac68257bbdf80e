//! Error types for process supervision.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a tool from being run at all.
///
/// Anything that happens once the tool is running is a
/// [`ProcessOutcome`](super::ProcessOutcome), not an error.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The executable does not exist or is not on `PATH`.
    #[error("Tool not found: {}", program.display())]
    ToolNotFound { program: PathBuf },

    /// Spawning or waiting on the process failed.
    #[error("Process I/O error: {0}")]
    Io(#[from] io::Error),
}
