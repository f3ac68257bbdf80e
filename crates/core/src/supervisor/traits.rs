//! Trait definitions for process supervision.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::registry::Recipe;

use super::error::SupervisorError;
use super::types::ProcessOutcome;

/// Runs a recipe's tool against a materialized input.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Runs the tool to completion, timeout or cancellation.
    ///
    /// `input` is the materialized input file and `output_dir` the directory
    /// the tool writes into. The tool's output is not inspected here.
    async fn run(
        &self,
        recipe: &Recipe,
        input: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, SupervisorError>;
}

#[async_trait]
impl<T: Supervisor + ?Sized> Supervisor for std::sync::Arc<T> {
    async fn run(
        &self,
        recipe: &Recipe,
        input: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, SupervisorError> {
        (**self).run(recipe, input, output_dir, cancel).await
    }
}
