//! Types for the job scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a conversion job.
///
/// Rendered and serialized as 32 lowercase hex digits; parsing also accepts
/// the hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl TryFrom<String> for JobId {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(job_id: JobId) -> Self {
        job_id.to_string()
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Queued -> Running -> Validating -> Succeeded
/// Queued -> Running -> Cancelled | Failed
/// Validating -> Failed
/// Queued -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for an execution slot.
    Queued,
    /// Holding a slot; the tool may be running.
    Running,
    /// The tool exited cleanly; its output is being verified.
    Validating,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether the state can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Validating => "validating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Validating)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Validating, Succeeded)
                | (Validating, Failed)
                | (Validating, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job known to the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// Snapshot of the slot pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Slots currently held.
    pub active_jobs: usize,
    /// Slot capacity.
    pub max_concurrent: usize,
    /// Jobs waiting for a slot.
    pub queued_jobs: usize,
    /// Highest number of slots held at once since start.
    pub peak_active: usize,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
}
