//! The conversion orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::format::{detect_format, Format, SNIFF_LEN};
use crate::metrics;
use crate::registry::{FormatRegistry, Recipe};
use crate::scheduler::{
    JobContext, JobHandle, JobId, JobScheduler, JobState, JobSummary, PoolStatus, SchedulerError,
};
use crate::supervisor::{ProcessOutcome, Supervisor};
use crate::workspace::{SourceData, Workspace, WorkspaceError, WorkspaceManager};

use super::error::ConversionError;
use super::types::{ConversionOutput, ConversionRequest, ConversionResult};

/// Everything a job needs once it holds a slot.
struct ConversionJob<S> {
    request: ConversionRequest,
    source_format: Format,
    recipe: Arc<Recipe>,
    workspaces: WorkspaceManager,
    supervisor: Arc<S>,
}

impl<S: Supervisor> ConversionJob<S> {
    #[instrument(
        name = "conversion",
        skip_all,
        fields(
            job_id = %ctx.job_id(),
            caller = %job.request.caller(),
            source = %job.source_format,
            target = %job.recipe.target,
            tool = job.recipe.tool.as_str(),
        )
    )]
    async fn run(job: Self, ctx: JobContext) -> ConversionResult {
        let start = Instant::now();

        let mut workspace = job.workspaces.open(ctx.job_id()).await?;
        let result = job.execute(&mut workspace, &ctx, start).await;

        // Released on every path; a failure here does not change the result.
        if let Err(e) = workspace.close().await {
            warn!(error = %e, "Failed to release workspace");
        }

        let elapsed = start.elapsed();
        metrics::CONVERSION_DURATION
            .with_label_values(&[job.recipe.tool.as_str()])
            .observe(elapsed.as_secs_f64());

        match &result {
            Ok(output) => info!(
                elapsed_ms = elapsed.as_millis() as u64,
                size_bytes = output.size_bytes(),
                "Conversion succeeded"
            ),
            Err(e) => warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                kind = e.kind().as_str(),
                error = %e,
                "Conversion did not complete"
            ),
        }
        result
    }

    async fn execute(
        &self,
        workspace: &mut Workspace,
        ctx: &JobContext,
        start: Instant,
    ) -> ConversionResult {
        let input = workspace
            .materialize(self.request.source(), self.source_format)
            .await?;

        let outcome = self
            .supervisor
            .run(&self.recipe, &input, workspace.path(), ctx.cancellation_token())
            .await?;

        match outcome {
            ProcessOutcome::Completed { .. } => {}
            ProcessOutcome::ToolError {
                exit_code,
                stderr_tail,
            } => {
                return Err(ConversionError::ToolError {
                    exit_code,
                    stderr_tail,
                })
            }
            ProcessOutcome::Timeout { after } => return Err(ConversionError::Timeout { after }),
            ProcessOutcome::Cancelled => return Err(ConversionError::Cancelled),
        }

        ctx.mark_validating().await;

        let output = workspace.locate_output(&self.recipe.output_extension).await?;
        let size_bytes = tokio::fs::metadata(&output)
            .await
            .map_err(|e| WorkspaceError::io(&output, e))?
            .len();
        let exported = workspace.export(&output).await?;

        Ok(ConversionOutput::new(
            exported,
            self.recipe.target,
            size_bytes,
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Entry point for conversions.
///
/// Detects the source format, resolves the recipe, queues the job and hands
/// back its result. Resolution failures are reported before a job exists.
pub struct ConversionOrchestrator<S: Supervisor> {
    registry: Arc<FormatRegistry>,
    scheduler: JobScheduler,
    workspaces: WorkspaceManager,
    supervisor: Arc<S>,
}

impl<S: Supervisor> Clone for ConversionOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            scheduler: self.scheduler.clone(),
            workspaces: self.workspaces.clone(),
            supervisor: Arc::clone(&self.supervisor),
        }
    }
}

impl<S: Supervisor + 'static> ConversionOrchestrator<S> {
    pub fn new(
        registry: Arc<FormatRegistry>,
        scheduler: JobScheduler,
        workspaces: WorkspaceManager,
        supervisor: S,
    ) -> Self {
        Self {
            registry,
            scheduler,
            workspaces,
            supervisor: Arc::new(supervisor),
        }
    }

    /// Converts a file and waits for the result.
    pub async fn convert(&self, request: ConversionRequest) -> ConversionResult {
        self.submit(request).await?.wait().await
    }

    /// Queues a conversion and returns its handle without waiting.
    pub async fn submit(&self, request: ConversionRequest) -> Result<JobHandle, ConversionError> {
        let head = request.source().head(SNIFF_LEN).await.map_err(|e| {
            let path = match request.source() {
                SourceData::Path(path) => path.clone(),
                SourceData::Bytes(_) => PathBuf::new(),
            };
            WorkspaceError::io(path, e)
        })?;

        let source_format = detect_format(request.declared_format(), request.file_name(), &head)?;
        let recipe = self.registry.resolve(source_format, request.target())?;

        let job_id = JobId::new();
        info!(
            job_id = %job_id,
            caller = %request.caller(),
            source = %source_format,
            target = %request.target(),
            "Conversion queued"
        );

        let job = ConversionJob {
            request,
            source_format,
            recipe,
            workspaces: self.workspaces.clone(),
            supervisor: Arc::clone(&self.supervisor),
        };

        Ok(self
            .scheduler
            .submit(job_id, move |ctx| ConversionJob::run(job, ctx))
            .await)
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.scheduler.cancel(job_id).await
    }

    pub async fn status(&self, job_id: JobId) -> Option<JobState> {
        self.scheduler.status(job_id).await
    }

    pub async fn jobs(&self) -> Vec<JobSummary> {
        self.scheduler.jobs().await
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.scheduler.pool_status()
    }

    /// Cancels unfinished conversions and waits up to `wait` for their tools
    /// and workspaces to be cleaned up.
    pub async fn shutdown(&self, wait: Duration) -> Result<usize, usize> {
        self.scheduler.shutdown(wait).await
    }

    /// Formats a file of type `source` can be converted into.
    pub fn supported_targets(&self, source: Format) -> Vec<Format> {
        self.registry.targets_for(source)
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }
}
