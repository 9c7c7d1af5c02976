//! Job Service
//!
//! The job orchestrator is the only writer of job status. Every change goes
//! through a compare-and-set on the job's row: the row is read, the transition
//! is checked against the lifecycle rules, and the update is applied only if
//! the row still holds the status that was checked. A lost race re-reads and
//! re-checks, so concurrent callbacks and cancellations on one job serialize
//! without any process-wide lock.

use chrono::Utc;
use conductor_core::domain::audit::{AuditAction, AuditEvent};
use conductor_core::domain::job::{IllegalTransition, Job, JobStatus, Transition};
use conductor_core::domain::registry::{ScriptRef, TargetRef};
use conductor_core::domain::stats::JobStatistics;
use conductor_core::dto::job::{CreateJob, JobFilter, Page, PageRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::dispatch::{DispatchGateway, WorkUnit};
use crate::error::{DispatchError, OrchestratorError, Result};
use crate::repository::{AuditSink, JobRepository, JobUpdate, NewJob, ScriptRegistry, TargetRegistry};

/// Error message stored on a job cancelled by a user
pub const CANCELLED_MARKER: &str = "Job cancelled by user";

/// Rounds of read, check and compare-and-set before giving up on a busy job
const MAX_CAS_ATTEMPTS: usize = 5;

/// Caller-side retry policy for dispatching a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): doubles each time, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// State-machine authority for jobs
pub struct JobOrchestrator {
    jobs: Arc<dyn JobRepository>,
    scripts: Arc<dyn ScriptRegistry>,
    targets: Arc<dyn TargetRegistry>,
    gateway: Arc<dyn DispatchGateway>,
    audit: Arc<dyn AuditSink>,
    dispatch_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        scripts: Arc<dyn ScriptRegistry>,
        targets: Arc<dyn TargetRegistry>,
        gateway: Arc<dyn DispatchGateway>,
        audit: Arc<dyn AuditSink>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            scripts,
            targets,
            gateway,
            audit,
            dispatch_timeout,
        }
    }

    /// Creates a job in `pending`.
    ///
    /// Dispatch is a separate step; see [`JobOrchestrator::dispatch`].
    pub async fn create(&self, principal_id: i64, req: CreateJob) -> Result<Job> {
        self.resolve_references(req.script_id, req.target_id).await?;

        let job = self
            .jobs
            .insert(NewJob {
                token: Uuid::new_v4(),
                script_id: req.script_id,
                target_id: req.target_id,
                principal_id,
                extra_parameters: req.extra_parameters,
            })
            .await?;

        tracing::info!(
            "Job {} ({}) created for script {} on target {}",
            job.id,
            job.token,
            job.script_id,
            job.target_id
        );

        self.emit(AuditEvent::job(
            Some(principal_id),
            AuditAction::Create,
            job.id,
            json!({
                "job_token": job.token,
                "script_id": job.script_id,
                "target_id": job.target_id,
            }),
        ))
        .await;

        Ok(job)
    }

    pub async fn get(&self, job_id: i64) -> Result<Job> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::job_not_found(job_id))
    }

    pub async fn get_by_token(&self, token: Uuid) -> Result<Job> {
        self.jobs
            .find_by_token(token)
            .await?
            .ok_or_else(|| OrchestratorError::Reference(format!("Job {} not found", token)))
    }

    pub async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>> {
        Ok(self.jobs.list(filter, page).await?)
    }

    /// Stores the worker handle of a dispatched job.
    ///
    /// Repeating the call with the recorded handle is a no-op; a different
    /// handle is a conflict.
    pub async fn record_dispatch(&self, job_id: i64, handle: &str) -> Result<Job> {
        if let Some(job) = self.jobs.set_worker_handle_if_unset(job_id, handle).await? {
            tracing::debug!("Job {} bound to worker unit {}", job_id, handle);
            return Ok(job);
        }

        let job = self.get(job_id).await?;
        match job.worker_handle.as_deref() {
            Some(existing) if existing == handle => Ok(job),
            Some(existing) => Err(OrchestratorError::Conflict(format!(
                "Job {} is already bound to worker unit {}",
                job_id, existing
            ))),
            None => Err(OrchestratorError::Conflict(format!(
                "Job {} changed while recording worker unit {}",
                job_id, handle
            ))),
        }
    }

    /// Applies a worker-reported status.
    ///
    /// Re-delivery of the current status returns the job unchanged. Leaving a
    /// terminal status is rejected and logged, since it means the worker is
    /// still reporting on a job that has already ended.
    pub async fn apply_status(
        &self,
        job_id: i64,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.get(job_id).await?;

            match job.status.check_transition(status) {
                Ok(Transition::Unchanged) => return Ok(job),
                Ok(Transition::Advance) => {}
                Err(source) => {
                    tracing::warn!(
                        "Rejected late status report for job {}: {}",
                        job_id,
                        source
                    );
                    return Err(OrchestratorError::InvalidTransition { job_id, source });
                }
            }

            let update = plan_status_change(status, error_message.clone());
            if let Some(updated) = self.jobs.compare_and_set(job_id, job.status, update).await? {
                tracing::info!("Job {} moved from {} to {}", job_id, job.status, status);
                return Ok(updated);
            }

            tracing::debug!("Job {} changed during status update, retrying", job_id);
        }

        Err(busy(job_id))
    }

    /// Cancels a job on behalf of a user.
    ///
    /// The cancellation is committed before the worker is asked to stop, and
    /// the request to the worker runs in the background.
    pub async fn cancel(&self, job_id: i64, principal_id: i64) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.get(job_id).await?;

            job.status
                .check_cancel()
                .map_err(|source| OrchestratorError::InvalidTransition { job_id, source })?;

            let update = JobUpdate {
                status: JobStatus::Cancelled,
                error_message: Some(CANCELLED_MARKER.to_string()),
                started_at: None,
                completed_at: Some(Utc::now()),
            };

            let Some(cancelled) = self.jobs.compare_and_set(job_id, job.status, update).await?
            else {
                tracing::debug!("Job {} changed during cancellation, retrying", job_id);
                continue;
            };

            tracing::info!("Job {} cancelled by principal {}", job_id, principal_id);

            self.emit(AuditEvent::job(
                Some(principal_id),
                AuditAction::Cancel,
                job_id,
                json!({
                    "job_token": cancelled.token,
                    "previous_status": job.status,
                    "reason": "cancelled_by_user",
                }),
            ))
            .await;

            if let Some(handle) = &cancelled.worker_handle {
                self.terminate_in_background(handle.clone());
            }

            return Ok(cancelled);
        }

        Err(busy(job_id))
    }

    /// Counts jobs per status, optionally for one principal
    pub async fn statistics(&self, principal_id: Option<i64>) -> Result<JobStatistics> {
        let counts = self.jobs.count_by_status(principal_id).await?;
        Ok(counts.into())
    }

    /// Hands a pending job to the worker pool once.
    ///
    /// A job that already has a worker handle is returned as is. On failure the
    /// job stays `pending` without a handle and can be dispatched again.
    pub async fn dispatch(&self, job_id: i64, principal_id: Option<i64>) -> Result<Job> {
        let job = self.get(job_id).await?;

        if job.worker_handle.is_some() {
            return Ok(job);
        }

        if job.status != JobStatus::Pending {
            return Err(OrchestratorError::InvalidTransition {
                job_id,
                source: IllegalTransition {
                    from: job.status,
                    to: JobStatus::Running,
                },
            });
        }

        let (script, target) = self.resolve_references(job.script_id, job.target_id).await?;

        let unit = WorkUnit {
            job_id: job.id,
            job_token: job.token,
            script: (&script).into(),
            target: (&target).into(),
            extra_parameters: job.extra_parameters.clone(),
        };

        let handle = match tokio::time::timeout(self.dispatch_timeout, self.gateway.enqueue(unit))
            .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(self.dispatch_failed(&job, principal_id, e).await),
            Err(_) => {
                let e = DispatchError::TimedOut(self.dispatch_timeout);
                return Err(self.dispatch_failed(&job, principal_id, e).await);
            }
        };

        let dispatched = self.record_dispatch(job_id, &handle).await?;

        self.emit(AuditEvent::job(
            principal_id,
            AuditAction::Dispatch,
            job_id,
            json!({ "job_token": dispatched.token, "worker_handle": handle }),
        ))
        .await;

        // Cancelled while the worker pool was accepting it
        if dispatched.status.is_terminal() {
            tracing::warn!(
                "Job {} reached {} during dispatch, stopping worker unit {}",
                job_id,
                dispatched.status,
                handle
            );
            self.terminate_in_background(handle);
        }

        Ok(dispatched)
    }

    /// Dispatches with exponential backoff; marks the job failed when every
    /// attempt failed.
    ///
    /// Only dispatch errors are retried. The last dispatch error is returned
    /// after the job has been marked failed.
    pub async fn dispatch_with_retry(
        &self,
        job_id: i64,
        principal_id: Option<i64>,
        policy: &RetryPolicy,
    ) -> Result<Job> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.dispatch(job_id, principal_id).await {
                Err(OrchestratorError::Dispatch(err)) => err,
                other => return other,
            };

            if attempt >= attempts {
                let message = format!("dispatch failed after {} attempt(s): {}", attempt, err);
                tracing::error!("Job {}: {}", job_id, message);

                if let Err(e) = self
                    .apply_status(job_id, JobStatus::Failed, Some(message))
                    .await
                {
                    tracing::warn!("Could not mark job {} as failed: {}", job_id, e);
                }

                return Err(err.into());
            }

            let delay = policy.backoff(attempt - 1);
            tracing::warn!(
                "Dispatch attempt {}/{} for job {} failed: {}; retrying in {:?}",
                attempt,
                attempts,
                job_id,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Looks up the script and target, both of which must exist and be active
    async fn resolve_references(
        &self,
        script_id: i64,
        target_id: i64,
    ) -> Result<(ScriptRef, TargetRef)> {
        let script = self
            .scripts
            .lookup(script_id)
            .await?
            .ok_or_else(|| OrchestratorError::Reference(format!("Script {} not found", script_id)))?;

        if !script.active {
            return Err(OrchestratorError::Reference(format!(
                "Script {} is not active",
                script_id
            )));
        }

        let target = self
            .targets
            .lookup(target_id)
            .await?
            .ok_or_else(|| OrchestratorError::Reference(format!("Target {} not found", target_id)))?;

        if !target.active {
            return Err(OrchestratorError::Reference(format!(
                "Target {} is not active",
                target_id
            )));
        }

        Ok((script, target))
    }

    async fn dispatch_failed(
        &self,
        job: &Job,
        principal_id: Option<i64>,
        err: DispatchError,
    ) -> OrchestratorError {
        tracing::warn!("Dispatch of job {} failed: {}", job.id, err);

        self.emit(AuditEvent::job(
            principal_id,
            AuditAction::DispatchFailed,
            job.id,
            json!({ "job_token": job.token, "error": err.to_string() }),
        ))
        .await;

        err.into()
    }

    fn terminate_in_background(&self, handle: String) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            gateway.request_termination(&handle).await;
        });
    }

    /// Records an audit event; a failed write is logged and otherwise ignored
    async fn emit(&self, event: AuditEvent) {
        let action = event.action;
        let job_id = event.resource_id;
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(
                "Failed to record {} audit event for job {}: {}",
                action.as_str(),
                job_id,
                e
            );
        }
    }
}

/// Builds the update for an accepted transition to `status`
fn plan_status_change(status: JobStatus, error_message: Option<String>) -> JobUpdate {
    let now = Utc::now();
    JobUpdate {
        status,
        error_message,
        started_at: (status == JobStatus::Running).then_some(now),
        completed_at: status.is_terminal().then_some(now),
    }
}

fn busy(job_id: i64) -> OrchestratorError {
    OrchestratorError::Conflict(format!(
        "Job {} kept changing during the update; re-read and try again",
        job_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ACTIVE_SCRIPT, ACTIVE_TARGET, Harness, INACTIVE_SCRIPT, INACTIVE_TARGET};
    use std::collections::HashMap;

    fn request(script_id: i64, target_id: i64) -> CreateJob {
        CreateJob {
            script_id,
            target_id,
            extra_parameters: HashMap::new(),
        }
    }

    async fn pending_job(harness: &Harness) -> Job {
        harness
            .orchestrator
            .create(1, request(ACTIVE_SCRIPT, ACTIVE_TARGET))
            .await
            .unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_plan_sets_timestamps_by_target_status() {
        let running = plan_status_change(JobStatus::Running, None);
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        let failed = plan_status_change(JobStatus::Failed, Some("exit 2".to_string()));
        assert!(failed.started_at.is_none());
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.error_message.as_deref(), Some("exit 2"));
    }

    #[tokio::test]
    async fn test_create_stores_pending_job_and_audits() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.worker_handle.is_none());
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());

        let events = harness.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Create);
        assert_eq!(events[0].resource_type, "job");
        assert_eq!(events[0].resource_id, job.id);
    }

    #[tokio::test]
    async fn test_create_with_inactive_script_persists_nothing() {
        let harness = Harness::new();

        let err = harness
            .orchestrator
            .create(1, request(INACTIVE_SCRIPT, ACTIVE_TARGET))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Reference(_)));
        let page = harness
            .orchestrator
            .list(&JobFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(harness.audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_missing_or_inactive_target() {
        let harness = Harness::new();

        for target_id in [INACTIVE_TARGET, 404] {
            let err = harness
                .orchestrator
                .create(1, request(ACTIVE_SCRIPT, target_id))
                .await
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::Reference(_)));
        }
    }

    #[tokio::test]
    async fn test_create_succeeds_when_audit_sink_is_down() {
        let harness = Harness::new();
        harness.audit.set_unavailable(true);

        let job = pending_job(&harness).await;
        assert_eq!(harness.orchestrator.get(job.id).await.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_token() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        assert_eq!(harness.orchestrator.get_by_token(job.token).await.unwrap().id, job.id);
        assert!(matches!(
            harness.orchestrator.get(999).await,
            Err(OrchestratorError::Reference(_))
        ));
        assert!(matches!(
            harness.orchestrator.get_by_token(Uuid::new_v4()).await,
            Err(OrchestratorError::Reference(_))
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_sets_both_timestamps() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        let orchestrator = &harness.orchestrator;

        orchestrator.record_dispatch(job.id, "w-1").await.unwrap();
        let running = orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        let done = orchestrator
            .apply_status(job.id, JobStatus::Success, None)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Success);
        assert_eq!(done.worker_handle.as_deref(), Some("w-1"));
        let started = done.started_at.unwrap();
        let completed = done.completed_at.unwrap();
        assert_eq!(Some(started), running.started_at);
        assert!(started <= completed);
    }

    #[tokio::test]
    async fn test_late_callback_after_cancel_is_rejected() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        let cancelled = harness.orchestrator.cancel(job.id, 1).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_MARKER));
        assert!(cancelled.completed_at.is_some());

        let err = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                source: IllegalTransition {
                    from: JobStatus::Cancelled,
                    to: JobStatus::Running
                },
                ..
            }
        ));

        let stored = harness.orchestrator.get(job.id).await.unwrap();
        assert_eq!(stored, cancelled);
    }

    #[tokio::test]
    async fn test_terminal_jobs_never_change() {
        let harness = Harness::new();

        for terminal in [JobStatus::Success, JobStatus::Failed, JobStatus::Cancelled] {
            let job = pending_job(&harness).await;
            harness
                .orchestrator
                .apply_status(job.id, JobStatus::Running, None)
                .await
                .unwrap();
            let ended = harness
                .orchestrator
                .apply_status(job.id, terminal, Some("done".to_string()))
                .await
                .unwrap();

            for next in JobStatus::ALL {
                let _ = harness
                    .orchestrator
                    .apply_status(job.id, next, Some("late".to_string()))
                    .await;
            }

            let stored = harness.orchestrator.get(job.id).await.unwrap();
            assert_eq!(stored.status, terminal);
            assert_eq!(stored.started_at, ended.started_at);
            assert_eq!(stored.completed_at, ended.completed_at);
            assert_eq!(stored.error_message.as_deref(), Some("done"));
        }
    }

    #[tokio::test]
    async fn test_repeated_status_is_idempotent() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        let once = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        let twice = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        assert_eq!(once, twice);

        let failed = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Failed, Some("exit 1".to_string()))
            .await
            .unwrap();
        let again = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Failed, Some("exit 1".to_string()))
            .await
            .unwrap();
        assert_eq!(failed, again);
    }

    #[tokio::test]
    async fn test_started_at_only_after_running() {
        let harness = Harness::new();

        let skipped = pending_job(&harness).await;
        let done = harness
            .orchestrator
            .apply_status(skipped.id, JobStatus::Success, None)
            .await
            .unwrap();
        assert!(done.started_at.is_none());
        assert!(done.completed_at.is_some());

        let ran = pending_job(&harness).await;
        let running = harness
            .orchestrator
            .apply_status(ran.id, JobStatus::Running, None)
            .await
            .unwrap();
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_running_cannot_return_to_pending() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness
            .orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();

        let err = harness
            .orchestrator
            .apply_status(job.id, JobStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_record_dispatch_is_idempotent_but_conflicts_on_new_handle() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        harness.orchestrator.record_dispatch(job.id, "w-1").await.unwrap();
        let again = harness.orchestrator.record_dispatch(job.id, "w-1").await.unwrap();
        assert_eq!(again.worker_handle.as_deref(), Some("w-1"));

        let err = harness
            .orchestrator
            .record_dispatch(job.id, "w-2")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict(_)));

        assert!(matches!(
            harness.orchestrator.record_dispatch(999, "w-1").await,
            Err(OrchestratorError::Reference(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let harness = Harness::new();
        let orchestrator = &harness.orchestrator;

        let failed = pending_job(&harness).await;
        orchestrator
            .apply_status(failed.id, JobStatus::Failed, Some("exit 1".to_string()))
            .await
            .unwrap();
        let completed_at = orchestrator.get(failed.id).await.unwrap().completed_at;
        let overridden = orchestrator.cancel(failed.id, 1).await.unwrap();
        assert_eq!(overridden.status, JobStatus::Cancelled);
        assert_eq!(overridden.error_message.as_deref(), Some(CANCELLED_MARKER));
        assert_eq!(overridden.completed_at, completed_at);

        let succeeded = pending_job(&harness).await;
        orchestrator
            .apply_status(succeeded.id, JobStatus::Success, None)
            .await
            .unwrap();
        assert!(matches!(
            orchestrator.cancel(succeeded.id, 1).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));

        assert!(matches!(
            orchestrator.cancel(overridden.id, 1).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_requests_termination_of_dispatched_unit() {
        let mut harness = Harness::new();
        let job = pending_job(&harness).await;

        let dispatched = harness.orchestrator.dispatch(job.id, Some(1)).await.unwrap();
        let handle = dispatched.worker_handle.clone().unwrap();
        harness
            .orchestrator
            .apply_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();

        harness.orchestrator.cancel(job.id, 1).await.unwrap();

        let terminated = tokio::time::timeout(Duration::from_secs(1), harness.terminations.recv())
            .await
            .unwrap();
        assert_eq!(terminated, Some(handle));

        let actions: Vec<AuditAction> = harness.audit.events().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Create, AuditAction::Dispatch, AuditAction::Cancel]
        );
    }

    #[tokio::test]
    async fn test_cancel_without_handle_sends_no_termination() {
        let mut harness = Harness::new();
        let job = pending_job(&harness).await;

        harness.orchestrator.cancel(job.id, 1).await.unwrap();
        tokio::task::yield_now().await;

        assert!(harness.terminations.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_during_enqueue_terminates_the_new_unit() {
        let mut harness = Harness::new();
        let job_id = pending_job(&harness).await.id;
        harness.gateway.hold();

        let orchestrator = harness.orchestrator.clone();
        let dispatch = tokio::spawn(async move { orchestrator.dispatch(job_id, Some(1)).await });

        harness.gateway.wait_for_enqueue().await;
        let cancelled = harness.orchestrator.cancel(job_id, 1).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.worker_handle.is_none());

        harness.gateway.release();
        let dispatched = dispatch.await.unwrap().unwrap();
        assert_eq!(dispatched.status, JobStatus::Cancelled);
        assert_eq!(dispatched.worker_handle.as_deref(), Some("w-1"));

        let terminated = tokio::time::timeout(Duration::from_secs(1), harness.terminations.recv())
            .await
            .unwrap();
        assert_eq!(terminated.as_deref(), Some("w-1"));
        assert!(harness.terminations.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_records_handle_and_is_idempotent() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;

        let first = harness.orchestrator.dispatch(job.id, Some(1)).await.unwrap();
        let second = harness.orchestrator.dispatch(job.id, Some(1)).await.unwrap();

        assert_eq!(first.status, JobStatus::Pending);
        assert!(first.worker_handle.is_some());
        assert_eq!(first.worker_handle, second.worker_handle);
        assert_eq!(harness.gateway.enqueued().len(), 1);

        let unit = &harness.gateway.enqueued()[0];
        assert_eq!(unit.job_id, job.id);
        assert_eq!(unit.job_token, job.token);
        assert_eq!(unit.script.id, ACTIVE_SCRIPT);
        assert_eq!(unit.target.id, ACTIVE_TARGET);
    }

    #[tokio::test]
    async fn test_failed_dispatch_leaves_job_pending() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness.gateway.fail_next(1);

        let err = harness.orchestrator.dispatch(job.id, Some(1)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Dispatch(_)));

        let stored = harness.orchestrator.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.worker_handle.is_none());
        assert!(harness
            .audit
            .events()
            .iter()
            .any(|e| e.action == AuditAction::DispatchFailed));

        let retried = harness.orchestrator.dispatch(job.id, Some(1)).await.unwrap();
        assert!(retried.worker_handle.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_times_out() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness.gateway.set_hanging(true);

        let err = harness.orchestrator.dispatch(job.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Dispatch(DispatchError::TimedOut(_))
        ));
        assert_eq!(
            harness.orchestrator.get(job.id).await.unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_dispatch_requires_pending() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness.orchestrator.cancel(job.id, 1).await.unwrap();

        assert!(matches!(
            harness.orchestrator.dispatch(job.id, None).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
        assert!(harness.gateway.enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_with_retry_recovers() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness.gateway.fail_next(2);

        let dispatched = harness
            .orchestrator
            .dispatch_with_retry(job.id, Some(1), &harness.retry)
            .await
            .unwrap();

        assert_eq!(dispatched.status, JobStatus::Pending);
        assert!(dispatched.worker_handle.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_with_retry_marks_job_failed_when_exhausted() {
        let harness = Harness::new();
        let job = pending_job(&harness).await;
        harness.gateway.fail_next(10);

        let err = harness
            .orchestrator
            .dispatch_with_retry(job.id, Some(1), &harness.retry)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Dispatch(_)));

        let stored = harness.orchestrator.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.completed_at.is_some());
        assert!(stored
            .error_message
            .unwrap()
            .starts_with("dispatch failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_statistics_over_mixed_jobs() {
        let harness = Harness::new();

        let outcomes = std::iter::repeat_n(JobStatus::Success, 7)
            .chain(std::iter::repeat_n(JobStatus::Failed, 2))
            .chain(std::iter::once(JobStatus::Cancelled));
        for status in outcomes {
            let job = pending_job(&harness).await;
            harness
                .orchestrator
                .apply_status(job.id, status, None)
                .await
                .unwrap();
        }

        let stats = harness.orchestrator.statistics(None).await.unwrap();
        assert_eq!(stats.total, 10);
        assert_eq!(stats.success, 7);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.success_rate, 80.0);

        let scoped = harness.orchestrator.statistics(Some(2)).await.unwrap();
        assert_eq!(scoped.total, 0);
        assert_eq!(scoped.success_rate, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completion_and_cancel_serialize() {
        let harness = Harness::new();

        for _ in 0..20 {
            let job = pending_job(&harness).await;
            harness
                .orchestrator
                .apply_status(job.id, JobStatus::Running, None)
                .await
                .unwrap();

            let finisher = {
                let orchestrator = Arc::clone(&harness.orchestrator);
                tokio::spawn(async move {
                    orchestrator
                        .apply_status(job.id, JobStatus::Success, None)
                        .await
                })
            };
            let canceller = {
                let orchestrator = Arc::clone(&harness.orchestrator);
                tokio::spawn(async move { orchestrator.cancel(job.id, 1).await })
            };

            let finished = finisher.await.unwrap();
            let cancelled = canceller.await.unwrap();
            let stored = harness.orchestrator.get(job.id).await.unwrap();

            match stored.status {
                JobStatus::Success => {
                    assert!(finished.is_ok());
                    assert!(cancelled.is_err());
                    assert!(stored.error_message.is_none());
                }
                JobStatus::Cancelled => {
                    assert!(cancelled.is_ok());
                    assert!(finished.is_err());
                    assert_eq!(stored.error_message.as_deref(), Some(CANCELLED_MARKER));
                }
                other => panic!("job ended in {}", other),
            }
            assert!(stored.completed_at.is_some());
        }
    }
}
