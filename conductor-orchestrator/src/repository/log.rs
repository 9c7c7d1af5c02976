//! Log Repository
//!
//! Append-only storage of job output. Line numbers are assigned per job by the
//! insert statement itself, so a whole batch lands in one round trip with no
//! explicit transaction. A single producer per job is assumed; concurrent
//! appenders to the same job collide on the `(job_id, line_number)` index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::domain::log::{LogLine, Severity};
use conductor_core::dto::log::NewLogLine;
use sqlx::PgPool;

use crate::error::StorageError;

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Appends one line and returns its number
    async fn append(&self, job_id: i64, line: NewLogLine) -> Result<i64, StorageError>;

    /// Appends lines in order and returns their numbers in the same order
    async fn append_batch(
        &self,
        job_id: i64,
        lines: Vec<NewLogLine>,
    ) -> Result<Vec<i64>, StorageError>;

    /// Lines with `line_number >= start_line`, ascending, at most `limit` of them
    async fn read(
        &self,
        job_id: i64,
        start_line: i64,
        limit: Option<i64>,
    ) -> Result<Vec<LogLine>, StorageError>;

    async fn count(&self, job_id: i64) -> Result<i64, StorageError>;
}

/// Postgres implementation of LogRepository
#[derive(Clone)]
pub struct PgLogRepository {
    pool: PgPool,
}

impl PgLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogRepository for PgLogRepository {
    async fn append(&self, job_id: i64, line: NewLogLine) -> Result<i64, StorageError> {
        let (line_number,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO job_logs (job_id, line_number, content, severity, captured_at)
            SELECT $1, COALESCE(MAX(line_number) + 1, 0), $2, $3, $4
            FROM job_logs
            WHERE job_id = $1
            RETURNING line_number
            "#,
        )
        .bind(job_id)
        .bind(&line.content)
        .bind(line.severity.unwrap_or_default().as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(line_number)
    }

    async fn append_batch(
        &self,
        job_id: i64,
        lines: Vec<NewLogLine>,
    ) -> Result<Vec<i64>, StorageError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let (contents, severities): (Vec<String>, Vec<String>) = lines
            .into_iter()
            .map(|line| {
                let severity = line.severity.unwrap_or_default().as_str().to_string();
                (line.content, severity)
            })
            .unzip();

        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO job_logs (job_id, line_number, content, severity, captured_at)
            SELECT $1, next.base + batch.ord - 1, batch.content, batch.severity, $4
            FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS batch(content, severity, ord),
                 (SELECT COALESCE(MAX(line_number) + 1, 0) AS base
                  FROM job_logs WHERE job_id = $1) AS next
            ORDER BY batch.ord
            RETURNING line_number
            "#,
        )
        .bind(job_id)
        .bind(&contents)
        .bind(&severities)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        // RETURNING order is unspecified; numbers were assigned in batch order
        let mut line_numbers: Vec<i64> = rows.into_iter().map(|(n,)| n).collect();
        line_numbers.sort_unstable();

        Ok(line_numbers)
    }

    async fn read(
        &self,
        job_id: i64,
        start_line: i64,
        limit: Option<i64>,
    ) -> Result<Vec<LogLine>, StorageError> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT job_id, line_number, content, severity, captured_at
            FROM job_logs
            WHERE job_id = $1 AND line_number >= $2
            ORDER BY line_number ASC
            LIMIT $3
            "#,
        )
        .bind(job_id)
        .bind(start_line)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LogLine::try_from).collect()
    }

    async fn count(&self, job_id: i64) -> Result<i64, StorageError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM job_logs WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    job_id: i64,
    line_number: i64,
    content: String,
    severity: String,
    captured_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for LogLine {
    type Error = StorageError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let severity = row
            .severity
            .parse::<Severity>()
            .map_err(|e| StorageError::InvalidRow(e.to_string()))?;

        Ok(LogLine {
            job_id: row.job_id,
            line_number: row.line_number,
            content: row.content,
            severity,
            captured_at: row.captured_at,
        })
    }
}
