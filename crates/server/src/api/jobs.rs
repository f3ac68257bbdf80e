//! Job inspection and cancellation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use filemorph_core::{JobId, JobState, JobSummary, PoolStatus};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
    pub pool: PoolStatus,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub state: JobState,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub message: String,
}

fn parse_job_id(id: &str) -> Result<JobId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::invalid_request(format!("Invalid job id: {}", id)))
}

/// Known jobs, oldest first, with the slot pool's status.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobsResponse> {
    let orchestrator = state.orchestrator();
    Json(JobsResponse {
        jobs: orchestrator.jobs().await,
        pool: orchestrator.pool_status(),
    })
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let job_state = state.orchestrator().status(job_id).await.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "job_not_found",
            format!("Job not found: {}", job_id),
        )
    })?;

    Ok(Json(JobStatusResponse {
        job_id,
        state: job_state,
    }))
}

/// Requests cancellation; the job reports `cancelled` once its tool is gone.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let job_id = parse_job_id(&id)?;
    state.orchestrator().cancel(job_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            message: "Cancellation requested".to_string(),
        }),
    ))
}
