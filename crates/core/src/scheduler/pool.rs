//! Bounded, first-come-first-served job pool.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::sync::{oneshot, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::metrics;
use crate::orchestrator::{ConversionError, ConversionResult};

use super::error::SchedulerError;
use super::types::{JobId, JobState, JobSummary, PoolStatus};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Tracks statistics for the slot pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicUsize,
    queued: AtomicUsize,
    peak_active: AtomicUsize,
    total_succeeded: AtomicU64,
    total_failed: AtomicU64,
    total_cancelled: AtomicU64,
}

#[derive(Debug)]
struct JobEntry {
    state: JobState,
    cancel: CancellationToken,
    submitted_at: DateTime<Utc>,
}

#[derive(Default)]
struct JobTable {
    entries: HashMap<JobId, JobEntry>,
    /// Terminal jobs, oldest first.
    finished: VecDeque<JobId>,
}

struct Inner {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    finished_retention: usize,
    jobs: RwLock<JobTable>,
    stats: PoolStats,
}

impl Inner {
    async fn transition(&self, job_id: JobId, next: JobState) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.entries.get_mut(&job_id) {
            if entry.state.can_transition_to(next) {
                debug!(job_id = %job_id, from = %entry.state, to = %next, "Job state changed");
                entry.state = next;
            } else {
                warn!(job_id = %job_id, from = %entry.state, to = %next, "Ignoring illegal job transition");
            }
        }
    }

    async fn finish(&self, job_id: JobId, result: &ConversionResult) {
        let state = terminal_state(result);
        let label = result_label(result);
        metrics::CONVERSIONS_TOTAL.with_label_values(&[label]).inc();
        match label {
            "succeeded" => self.stats.total_succeeded.fetch_add(1, Ordering::AcqRel),
            "cancelled" => self.stats.total_cancelled.fetch_add(1, Ordering::AcqRel),
            _ => self.stats.total_failed.fetch_add(1, Ordering::AcqRel),
        };

        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.entries.get_mut(&job_id) {
            debug!(job_id = %job_id, from = %entry.state, to = %state, "Job finished");
            entry.state = state;
        }
        jobs.finished.push_back(job_id);
        while jobs.finished.len() > self.finished_retention {
            if let Some(evicted) = jobs.finished.pop_front() {
                jobs.entries.remove(&evicted);
            }
        }
    }
}

/// Terminal state implied by a job's result.
fn terminal_state(result: &ConversionResult) -> JobState {
    match result {
        Ok(_) => JobState::Succeeded,
        Err(ConversionError::Cancelled) | Err(ConversionError::Timeout { .. }) => {
            JobState::Cancelled
        }
        Err(_) => JobState::Failed,
    }
}

/// Result label for metrics and pool statistics.
///
/// A timed-out job ends in the `Cancelled` state but counts as a failure:
/// only a caller's cancel is kept out of the failure figures.
fn result_label(result: &ConversionResult) -> &'static str {
    match result {
        Ok(_) => "succeeded",
        Err(ConversionError::Cancelled) => "cancelled",
        Err(ConversionError::Timeout { .. }) => "timeout",
        Err(_) => "failed",
    }
}

/// What a running job gets to see of the scheduler.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    cancel: CancellationToken,
    inner: Arc<Inner>,
}

impl JobContext {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Token cancelled when the job is cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Records that the tool finished and its output is being checked.
    pub async fn mark_validating(&self) {
        self.inner.transition(self.job_id, JobState::Validating).await;
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    cancel: CancellationToken,
    result_rx: oneshot::Receiver<ConversionResult>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Requests cancellation of this job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the job to reach a terminal state.
    pub async fn wait(self) -> ConversionResult {
        self.result_rx
            .await
            .unwrap_or_else(|_| {
                Err(ConversionError::Internal {
                    reason: "job task ended without reporting a result".to_string(),
                })
            })
    }
}

/// Runs jobs in a fixed number of slots.
///
/// Jobs that find every slot taken wait in submission order; a job is never
/// overtaken by one submitted after it. Job records stay queryable after they
/// finish, up to `finished_retention` of them.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let max_concurrent = config.max_concurrent_jobs.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                finished_retention: config.finished_retention,
                jobs: RwLock::new(JobTable::default()),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Queues a job.
    ///
    /// `work` runs once a slot is free and receives a [`JobContext`]. A job
    /// cancelled before it gets a slot finishes as `Cancelled` without
    /// `work` ever being called.
    pub async fn submit<F, Fut>(&self, job_id: JobId, work: F) -> JobHandle
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = ConversionResult> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        {
            let mut jobs = self.inner.jobs.write().await;
            jobs.entries.insert(
                job_id,
                JobEntry {
                    state: JobState::Queued,
                    cancel: cancel.clone(),
                    submitted_at: Utc::now(),
                },
            );
        }
        self.inner.stats.queued.fetch_add(1, Ordering::AcqRel);
        metrics::JOBS_QUEUED.inc();

        // Join the semaphore's wait queue here, in the caller's order, rather
        // than whenever the spawned task is first polled.
        let mut acquire = Box::pin(Arc::clone(&self.inner.semaphore).acquire_owned());
        let ready = match futures::poll!(acquire.as_mut()) {
            Poll::Ready(permit) => Some(permit),
            Poll::Pending => None,
        };

        let (result_tx, result_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();

        tokio::spawn(async move {
            let permit: Option<Result<OwnedSemaphorePermit, _>> = match ready {
                Some(_) if token.is_cancelled() => None,
                Some(permit) => Some(permit),
                None => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = acquire => Some(permit),
                },
            };

            inner.stats.queued.fetch_sub(1, Ordering::AcqRel);
            metrics::JOBS_QUEUED.dec();

            let result = match permit {
                None => {
                    debug!(job_id = %job_id, "Job cancelled while queued");
                    Err(ConversionError::Cancelled)
                }
                Some(Err(_)) => Err(ConversionError::Internal {
                    reason: "scheduler is shut down".to_string(),
                }),
                Some(Ok(permit)) => {
                    inner.transition(job_id, JobState::Running).await;
                    let active = inner.stats.active.fetch_add(1, Ordering::AcqRel) + 1;
                    inner.stats.peak_active.fetch_max(active, Ordering::AcqRel);
                    metrics::JOBS_RUNNING.inc();

                    let ctx = JobContext {
                        job_id,
                        cancel: token.clone(),
                        inner: Arc::clone(&inner),
                    };
                    let result = AssertUnwindSafe(work(ctx))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(ConversionError::Internal {
                                reason: "job panicked".to_string(),
                            })
                        });

                    inner.stats.active.fetch_sub(1, Ordering::AcqRel);
                    metrics::JOBS_RUNNING.dec();
                    drop(permit);
                    result
                }
            };

            inner.finish(job_id, &result).await;
            // The handle may have been dropped; the result is discarded then.
            let _ = result_tx.send(result);
        });

        JobHandle {
            job_id,
            cancel,
            result_rx,
        }
    }

    /// Cancels a queued or running job.
    pub async fn cancel(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let jobs = self.inner.jobs.read().await;
        let entry = jobs
            .entries
            .get(&job_id)
            .ok_or(SchedulerError::JobNotFound(job_id))?;

        if entry.state.is_terminal() {
            return Err(SchedulerError::AlreadyFinished {
                job_id,
                state: entry.state,
            });
        }

        debug!(job_id = %job_id, state = %entry.state, "Cancelling job");
        entry.cancel.cancel();
        Ok(())
    }

    /// Current state of a job, if it is still known.
    pub async fn status(&self, job_id: JobId) -> Option<JobState> {
        let jobs = self.inner.jobs.read().await;
        jobs.entries.get(&job_id).map(|e| e.state)
    }

    /// Every known job, oldest first.
    pub async fn jobs(&self) -> Vec<JobSummary> {
        let jobs = self.inner.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs
            .entries
            .iter()
            .map(|(job_id, entry)| JobSummary {
                job_id: *job_id,
                state: entry.state,
                submitted_at: entry.submitted_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.submitted_at);
        summaries
    }

    /// Jobs that have not reached a terminal state, oldest first.
    pub async fn active_jobs(&self) -> Vec<JobSummary> {
        self.jobs()
            .await
            .into_iter()
            .filter(|s| !s.state.is_terminal())
            .collect()
    }

    /// Cancels every unfinished job and waits for them to wind down.
    ///
    /// Running tools get the usual terminate sequence, so their process
    /// groups and workspaces are gone once this returns `Ok`. Returns the
    /// number of jobs that were cancelled, or the number still unfinished
    /// when `wait` ran out.
    pub async fn shutdown(&self, wait: Duration) -> Result<usize, usize> {
        let cancelled = {
            let jobs = self.inner.jobs.read().await;
            let mut cancelled = 0;
            for entry in jobs.entries.values() {
                if !entry.state.is_terminal() {
                    entry.cancel.cancel();
                    cancelled += 1;
                }
            }
            cancelled
        };
        if cancelled > 0 {
            info!(cancelled, "Cancelling unfinished jobs");
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = self.active_jobs().await.len();
            if remaining == 0 {
                return Ok(cancelled);
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "Jobs still running at shutdown");
                return Err(remaining);
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }

    pub fn pool_status(&self) -> PoolStatus {
        let stats = &self.inner.stats;
        PoolStatus {
            active_jobs: stats.active.load(Ordering::Acquire),
            max_concurrent: self.inner.max_concurrent,
            queued_jobs: stats.queued.load(Ordering::Acquire),
            peak_active: stats.peak_active.load(Ordering::Acquire),
            total_succeeded: stats.total_succeeded.load(Ordering::Acquire),
            total_failed: stats.total_failed.load(Ordering::Acquire),
            total_cancelled: stats.total_cancelled.load(Ordering::Acquire),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }
}
