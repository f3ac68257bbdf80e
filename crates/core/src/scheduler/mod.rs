//! Job scheduling.
//!
//! The [`JobScheduler`] bounds how many conversions run at once. Jobs beyond
//! the slot count wait in submission order and can be cancelled while they
//! wait or while they run.

mod error;
mod pool;
mod types;

pub use error::SchedulerError;
pub use pool::{JobContext, JobHandle, JobScheduler};
pub use types::{JobId, JobState, JobSummary, PoolStatus};
