//! Error types for the job scheduler.

use thiserror::Error;

use super::types::{JobId, JobState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The job is unknown, or its record was already evicted.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The job already reached a terminal state.
    #[error("Job {job_id} already finished ({state})")]
    AlreadyFinished { job_id: JobId, state: JobState },
}
