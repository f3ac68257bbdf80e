//! Conversion failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::format::{Format, FormatError};
use crate::registry::RegistryError;
use crate::supervisor::SupervisorError;
use crate::workspace::WorkspaceError;

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// Why a conversion did not produce an output.
///
/// Lower layers' failures are carried as they are: a missing tool stays
/// `ToolUnavailable`, a timeout stays `Timeout`.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// No recipe converts the source format into the target.
    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: Format, to: Format },

    /// The source format could not be determined.
    #[error("Unrecognized source format: {0}")]
    UnrecognizedFormat(#[from] FormatError),

    /// The tool ran past its recipe's budget and was killed.
    #[error("Tool timed out after {}s", after.as_secs_f64())]
    Timeout { after: Duration },

    /// The job was cancelled before or while running.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The tool exited unsuccessfully.
    #[error("Tool exited with {}: {stderr_tail}", exit_label(exit_code))]
    ToolError {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// The tool reported success but left no usable output.
    #[error("Tool produced no usable .{extension} output")]
    MissingOutput { extension: String },

    /// The tool's executable could not be launched.
    #[error("Tool not available: {}", program.display())]
    ToolUnavailable { program: PathBuf },

    /// Preparing or reading the job's workspace failed.
    #[error("Workspace error: {0}")]
    Workspace(WorkspaceError),

    /// The job ended without a result (panic, runtime shutdown).
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl ConversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedConversion { .. } => FailureKind::UnsupportedConversion,
            Self::UnrecognizedFormat(_) => FailureKind::UnrecognizedFormat,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            Self::ToolError { .. } => FailureKind::ToolError,
            Self::MissingOutput { .. } => FailureKind::MissingOutput,
            Self::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            Self::Workspace(_) => FailureKind::Workspace,
            Self::Internal { .. } => FailureKind::Internal,
        }
    }
}

impl From<WorkspaceError> for ConversionError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::MissingOutput { extension } => Self::MissingOutput { extension },
            other => Self::Workspace(other),
        }
    }
}

impl From<RegistryError> for ConversionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { from, to } => Self::UnsupportedConversion { from, to },
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl From<SupervisorError> for ConversionError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::ToolNotFound { program } => Self::ToolUnavailable { program },
            SupervisorError::Io(e) => Self::Internal {
                reason: format!("failed to run tool: {}", e),
            },
        }
    }
}

/// Failure category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedConversion,
    UnrecognizedFormat,
    Timeout,
    Cancelled,
    ToolError,
    MissingOutput,
    ToolUnavailable,
    Workspace,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedConversion => "unsupported_conversion",
            Self::UnrecognizedFormat => "unrecognized_format",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ToolError => "tool_error",
            Self::MissingOutput => "missing_output",
            Self::ToolUnavailable => "tool_unavailable",
            Self::Workspace => "workspace",
            Self::Internal => "internal",
        }
    }

    /// Text shown to the person who asked for the conversion.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnsupportedConversion => "This file can't be converted to the requested format.",
            Self::UnrecognizedFormat => "The file type could not be recognized.",
            Self::Timeout => "The conversion took too long and was stopped.",
            Self::Cancelled => "The conversion was cancelled.",
            Self::ToolError => "The converter could not process this file.",
            Self::MissingOutput => "The converter finished but produced no file.",
            Self::ToolUnavailable => "The converter for this format is not installed.",
            Self::Workspace => "A temporary storage problem occurred. Please try again.",
            Self::Internal => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
