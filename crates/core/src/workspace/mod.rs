//! Per-job scratch directories.
//!
//! A [`WorkspaceManager`] owns the scratch root. Each job opens a
//! [`Workspace`] named after its id, writes its input there, lets the tool
//! write its output next to it and releases the directory when the job ends,
//! whatever the outcome.

mod error;
mod manager;

pub use error::WorkspaceError;
pub use manager::{SourceData, Workspace, WorkspaceManager};
