//! Conversion orchestration.
//!
//! [`ConversionOrchestrator`] is the façade the messaging layer talks to. A
//! request is detected and resolved against the [`FormatRegistry`], queued on
//! the [`JobScheduler`], run in its own workspace by a [`Supervisor`] and
//! answered with a [`ConversionResult`].
//!
//! [`FormatRegistry`]: crate::registry::FormatRegistry
//! [`JobScheduler`]: crate::scheduler::JobScheduler
//! [`Supervisor`]: crate::supervisor::Supervisor

mod engine;
mod error;
mod types;

pub use engine::ConversionOrchestrator;
pub use error::{ConversionError, FailureKind};
pub use types::{CallerId, ConversionOutput, ConversionRequest, ConversionResult};
