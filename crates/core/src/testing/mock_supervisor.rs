//! Mock supervisor for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::format::Format;
use crate::registry::Recipe;
use crate::supervisor::{ProcessOutcome, Supervisor, SupervisorError};

/// A recorded tool run for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub source: Format,
    pub target: Format,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Whether the input existed when the tool was started.
    pub input_existed: bool,
}

/// What the mock tool does when run.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Writes `output.<ext>` with these bytes and exits cleanly.
    WriteOutput(Vec<u8>),
    /// Reports this outcome without writing anything.
    Outcome(ProcessOutcome),
    /// Fails to start, as if the executable were missing.
    ToolMissing,
}

/// Mock implementation of the Supervisor trait.
///
/// Provides controllable behavior for testing:
/// - Count runs and record their arguments
/// - Simulate success, tool failure or empty output
/// - Simulate slow tools, honoring the recipe's deadline and cancellation
/// - Track how many runs overlapped
///
/// # Example
///
/// ```rust,ignore
/// use filemorph_core::testing::{MockBehavior, MockSupervisor};
///
/// let supervisor = MockSupervisor::new().with_delay(Duration::from_millis(200));
/// supervisor.set_behavior(MockBehavior::WriteOutput(Vec::new())).await;
///
/// // Hand it to the orchestrator, then:
/// assert_eq!(supervisor.call_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockSupervisor {
    behavior: Arc<RwLock<MockBehavior>>,
    delay: Arc<RwLock<Duration>>,
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    calls: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak_running: Arc<AtomicUsize>,
}

impl Default for MockSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the running counter however the run ends.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl MockSupervisor {
    /// Create a mock tool that writes `converted` and succeeds immediately.
    pub fn new() -> Self {
        Self {
            behavior: Arc::new(RwLock::new(MockBehavior::WriteOutput(b"converted".to_vec()))),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            runs: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            peak_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the initial behavior.
    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(RwLock::new(behavior)),
            ..self
        }
    }

    /// Sets how long every run takes.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Arc::new(RwLock::new(delay)),
            ..self
        }
    }

    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Number of times `run` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Largest number of runs that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_running.load(Ordering::Acquire)
    }

    pub async fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    async fn run(
        &self,
        recipe: &Recipe,
        input: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, SupervisorError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let now_running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_running.fetch_max(now_running, Ordering::AcqRel);
        let _guard = RunningGuard(Arc::clone(&self.running));

        self.runs.write().await.push(RecordedRun {
            source: recipe.source,
            target: recipe.target,
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            input_existed: input.exists(),
        });

        let behavior = self.behavior.read().await.clone();
        if let MockBehavior::ToolMissing = behavior {
            return Err(SupervisorError::ToolNotFound {
                program: recipe.program.clone(),
            });
        }

        let delay = *self.delay.read().await;
        let timed_out = delay > recipe.max_duration;
        let wait = delay.min(recipe.max_duration);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ProcessOutcome::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
        if timed_out {
            return Ok(ProcessOutcome::Timeout {
                after: recipe.max_duration,
            });
        }

        match behavior {
            MockBehavior::WriteOutput(bytes) => {
                tokio::fs::write(output_dir.join(recipe.output_file_name()), bytes).await?;
                Ok(ProcessOutcome::Completed {
                    stderr_tail: String::new(),
                })
            }
            MockBehavior::Outcome(outcome) => Ok(outcome),
            MockBehavior::ToolMissing => Err(SupervisorError::ToolNotFound {
                program: recipe.program.clone(),
            }),
        }
    }
}
