//! Job-related API endpoints

use conductor_core::domain::job::{Job, JobStatus};
use conductor_core::domain::stats::JobStatistics;
use conductor_core::dto::job::{CreateJob, JobFilter, Page, PageRequest, StatusReport};
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

/// Query string of `GET /api/jobs`
#[derive(Debug, Serialize)]
struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal_id: Option<i64>,
    page: u32,
    per_page: u32,
}

impl ListQuery {
    fn new(filter: &JobFilter, page: PageRequest) -> Self {
        Self {
            status: filter.status,
            script_id: filter.script_id,
            target_id: filter.target_id,
            principal_id: filter.principal_id,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

impl OrchestratorClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Create a job; the orchestrator dispatches it before answering
    pub async fn create_job(&self, req: CreateJob) -> Result<Job> {
        let response = self
            .request(Method::POST, "/api/jobs")
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a job by its sequential id
    pub async fn get_job(&self, job_id: i64) -> Result<Job> {
        let path = format!("/api/jobs/{}", job_id);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_response(response).await
    }

    /// Get a job by its public token
    pub async fn get_job_by_token(&self, token: Uuid) -> Result<Job> {
        let path = format!("/api/jobs/token/{}", token);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_response(response).await
    }

    /// List jobs matching `filter`, newest first
    pub async fn list_jobs(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>> {
        let response = self
            .request(Method::GET, "/api/jobs")
            .query(&ListQuery::new(filter, page))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Job counts per status, optionally for one principal
    pub async fn job_statistics(&self, principal_id: Option<i64>) -> Result<JobStatistics> {
        let mut request = self.request(Method::GET, "/api/jobs/stats");
        if let Some(id) = principal_id {
            request = request.query(&[("principal_id", id)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Retry dispatching a pending job
    pub async fn dispatch_job(&self, job_id: i64) -> Result<Job> {
        let path = format!("/api/jobs/{}/dispatch", job_id);
        let response = self.request(Method::POST, &path).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a pending, running or failed job
    pub async fn cancel_job(&self, job_id: i64) -> Result<Job> {
        let path = format!("/api/jobs/{}/cancel", job_id);
        let response = self.request(Method::POST, &path).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Worker Callbacks
    // =============================================================================

    /// Report a status change for a job the caller is executing
    pub async fn report_status(
        &self,
        job_id: i64,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job> {
        let path = format!("/api/jobs/{}/status", job_id);
        let response = self
            .request(Method::POST, &path)
            .json(&StatusReport {
                status,
                error_message,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
