//! Error types for the format registry.

use thiserror::Error;

use crate::format::Format;

/// Errors raised while registering or resolving recipes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No recipe converts `from` into `to`.
    #[error("No conversion from {from} to {to}")]
    NotFound { from: Format, to: Format },

    /// A recipe for the pair is already registered.
    #[error("A recipe from {from} to {to} is already registered")]
    DuplicateRecipe { from: Format, to: Format },

    /// The recipe cannot be run as declared.
    #[error("Invalid recipe from {from} to {to}: {reason}")]
    InvalidRecipe {
        from: Format,
        to: Format,
        reason: String,
    },
}
