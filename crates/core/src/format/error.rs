//! Error types for format detection.

use thiserror::Error;

/// Errors that can occur while identifying a file format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The name does not match any known format.
    #[error("Unknown format: {name}")]
    Unknown { name: String },

    /// Neither the declared format, the file name nor the content identify the file.
    #[error("Could not recognize the file format")]
    Unrecognized,
}
