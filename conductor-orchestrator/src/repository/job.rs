//! Job Repository
//!
//! Durable job records. Every mutation is a single-row statement; status changes
//! are guarded by the status the caller last observed, so two writers racing on
//! the same job serialize on that row without any wider lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::domain::job::{Job, JobStatus};
use conductor_core::domain::stats::StatusCounts;
use conductor_core::dto::job::{JobFilter, Page, PageRequest};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StorageError;

/// Fields of a job that is about to be stored in `pending`
#[derive(Debug, Clone)]
pub struct NewJob {
    pub token: Uuid,
    pub script_id: i64,
    pub target_id: i64,
    pub principal_id: i64,
    pub extra_parameters: HashMap<String, serde_json::Value>,
}

/// A status change to apply to one job
///
/// Timestamps are write-once: a value is only stored when the column is
/// still empty, so neither `started_at` nor `completed_at` can be reset.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    /// Replaces the stored message when set
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// Applies the update to an in-memory copy of the job
    pub fn apply_to(&self, job: &mut Job) {
        job.status = self.status;
        if let Some(message) = &self.error_message {
            job.error_message = Some(message.clone());
        }
        if job.started_at.is_none() {
            job.started_at = self.started_at;
        }
        if job.completed_at.is_none() {
            job.completed_at = self.completed_at;
        }
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Stores a new job in `pending`
    async fn insert(&self, job: NewJob) -> Result<Job, StorageError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StorageError>;

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Job>, StorageError>;

    /// Lists jobs matching `filter`, newest first
    async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>, StorageError>;

    /// Applies `update` only if the job is still in `expected`.
    ///
    /// Returns the updated job, or `None` when the job is missing or its status
    /// changed since the caller read it.
    async fn compare_and_set(
        &self,
        id: i64,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<Job>, StorageError>;

    /// Records the worker handle unless one is already set.
    ///
    /// Returns `None` when the job is missing or already has a handle.
    async fn set_worker_handle_if_unset(
        &self,
        id: i64,
        handle: &str,
    ) -> Result<Option<Job>, StorageError>;

    /// Counts jobs per status, optionally for one principal
    async fn count_by_status(&self, principal_id: Option<i64>)
    -> Result<StatusCounts, StorageError>;
}

/// Postgres implementation of JobRepository
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id, token, script_id, target_id, principal_id, status, worker_handle, \
     error_message, extra_parameters, created_at, started_at, completed_at";

const FILTER_CLAUSE: &str = "WHERE ($1::text IS NULL OR status = $1) \
     AND ($2::bigint IS NULL OR script_id = $2) \
     AND ($3::bigint IS NULL OR target_id = $3) \
     AND ($4::bigint IS NULL OR principal_id = $4)";

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job, StorageError> {
        let sql = format!(
            r#"
            INSERT INTO jobs (token, script_id, target_id, principal_id, status, extra_parameters, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job.token)
            .bind(job.script_id)
            .bind(job.target_id)
            .bind(job.principal_id)
            .bind(JobStatus::Pending.as_str())
            .bind(serde_json::to_value(&job.extra_parameters)?)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StorageError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Job>, StorageError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE token = $1");

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>, StorageError> {
        let status = filter.status.map(JobStatus::as_str);

        let count_sql = format!("SELECT COUNT(*) FROM jobs {FILTER_CLAUSE}");
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(status)
            .bind(filter.script_id)
            .bind(filter.target_id)
            .bind(filter.principal_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            {FILTER_CLAUSE}
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(status)
            .bind(filter.script_id)
            .bind(filter.target_id)
            .bind(filter.principal_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, page, total))
    }

    async fn compare_and_set(
        &self,
        id: i64,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<Job>, StorageError> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = $1,
                error_message = COALESCE($2, error_message),
                started_at = COALESCE(started_at, $3),
                completed_at = COALESCE(completed_at, $4)
            WHERE id = $5 AND status = $6
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(update.status.as_str())
            .bind(update.error_message)
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn set_worker_handle_if_unset(
        &self,
        id: i64,
        handle: &str,
    ) -> Result<Option<Job>, StorageError> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET worker_handle = $1
            WHERE id = $2 AND worker_handle IS NULL
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(handle)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn count_by_status(
        &self,
        principal_id: Option<i64>,
    ) -> Result<StatusCounts, StorageError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM jobs
            WHERE ($1::bigint IS NULL OR principal_id = $1)
            GROUP BY status
            "#,
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(parse_status(&status)?, count);
        }

        Ok(counts)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_status(s: &str) -> Result<JobStatus, StorageError> {
    s.parse::<JobStatus>()
        .map_err(|e| StorageError::InvalidRow(e.to_string()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    token: Uuid,
    script_id: i64,
    target_id: i64,
    principal_id: i64,
    status: String,
    worker_handle: Option<String>,
    error_message: Option<String>,
    extra_parameters: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            token: row.token,
            script_id: row.script_id,
            target_id: row.target_id,
            principal_id: row.principal_id,
            status: parse_status(&row.status)?,
            worker_handle: row.worker_handle,
            error_message: row.error_message,
            extra_parameters: serde_json::from_value(row.extra_parameters)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
