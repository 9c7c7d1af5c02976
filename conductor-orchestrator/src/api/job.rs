//! Job API Handlers
//!
//! HTTP endpoints for job lifecycle management, worker callbacks and logs.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use conductor_core::domain::job::{Job, JobStatus};
use conductor_core::domain::principal::Role;
use conductor_core::domain::stats::JobStatistics;
use conductor_core::dto::job::{CreateJob, JobFilter, Page, PageRequest, StatusReport};
use conductor_core::dto::log::{AppendedLines, JobLogs, LogBatch};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::auth::Caller;
use crate::api::error::ApiResult;
use crate::api::extract::{JsonBody, PathParam, QueryParams};

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /api/jobs
/// Create a job and dispatch it to the worker pool
///
/// The job is returned even when dispatch failed: by then it has been marked
/// `failed` and carries the dispatch error.
pub async fn create_job(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    caller.require(Role::User)?;

    tracing::info!(
        "Principal {} creating job for script {} on target {}",
        caller.id(),
        req.script_id,
        req.target_id
    );

    let job = state.orchestrator.create(caller.id(), req).await?;

    let job = match state
        .orchestrator
        .dispatch_with_retry(job.id, Some(caller.id()), &state.retry)
        .await
    {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!("Job {} created but not dispatched: {}", job.id, e);
            state.orchestrator.get(job.id).await?
        }
    };

    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub script_id: Option<i64>,
    pub target_id: Option<i64>,
    pub principal_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/jobs
/// List jobs, newest first
pub async fn list_jobs(
    State(state): State<AppState>,
    caller: Caller,
    QueryParams(query): QueryParams<ListJobsQuery>,
) -> ApiResult<Json<Page<Job>>> {
    let filter = JobFilter {
        status: query.status,
        script_id: query.script_id,
        target_id: query.target_id,
        principal_id: caller.scope(query.principal_id)?,
    };
    let page = PageRequest::new(query.page, query.per_page);

    tracing::debug!("Listing jobs with {:?}, page {}", filter, page.page);

    let jobs = state.orchestrator.list(&filter, page).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub principal_id: Option<i64>,
}

/// GET /api/jobs/stats
pub async fn job_statistics(
    State(state): State<AppState>,
    caller: Caller,
    QueryParams(query): QueryParams<StatisticsQuery>,
) -> ApiResult<Json<JobStatistics>> {
    let principal_id = caller.scope(query.principal_id)?;
    let stats = state.orchestrator.statistics(principal_id).await?;
    Ok(Json(stats))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = state.orchestrator.get(id).await?;
    Ok(Json(job))
}

/// GET /api/jobs/token/{token}
pub async fn get_job_by_token(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(token): PathParam<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state.orchestrator.get_by_token(token).await?;
    Ok(Json(job))
}

/// POST /api/jobs/{id}/dispatch
/// Retry dispatching a pending job once
pub async fn dispatch_job(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Principal {} dispatching job {}", caller.id(), id);

    let job = state.orchestrator.dispatch(id, Some(caller.id())).await?;
    Ok(Json(job))
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Job>> {
    let job = state.orchestrator.cancel(id, caller.id()).await?;
    Ok(Json(job))
}

/// POST /api/jobs/{id}/status
/// Worker callback reporting a status change
pub async fn report_status(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<i64>,
    JsonBody(report): JsonBody<StatusReport>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Job {} reported {}", id, report.status);

    let job = state
        .orchestrator
        .apply_status(id, report.status, report.error_message)
        .await?;
    Ok(Json(job))
}

// =============================================================================
// Log Endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub start_line: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/jobs/{id}/logs
pub async fn get_job_logs(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<i64>,
    QueryParams(query): QueryParams<LogsQuery>,
) -> ApiResult<Json<JobLogs>> {
    let logs = state.logs.read(id, query.start_line, query.limit).await?;
    Ok(Json(logs))
}

/// POST /api/jobs/{id}/logs
/// Worker callback appending a batch of output lines
pub async fn append_job_logs(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<i64>,
    JsonBody(batch): JsonBody<LogBatch>,
) -> ApiResult<Json<AppendedLines>> {
    let line_numbers = state.logs.append_batch(id, batch.lines).await?;
    Ok(Json(AppendedLines { line_numbers }))
}
