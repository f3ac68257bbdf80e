//! Process supervision for external conversion tools.
//!
//! The [`Supervisor`] trait runs one recipe against one input with a hard
//! deadline and a cancellation token. [`ProcessSupervisor`] is the real
//! implementation; tests drive the orchestrator with
//! [`MockSupervisor`](crate::testing::MockSupervisor).

mod error;
mod process;
mod traits;
mod types;

pub use error::SupervisorError;
pub use process::{probe_tool, ProcessSupervisor, WORKDIR_MARKER};
pub use traits::Supervisor;
pub use types::ProcessOutcome;
