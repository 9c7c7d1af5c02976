//! Log Service
//!
//! Validates and stores output lines reported by workers, and serves windows
//! of a job's log stream.

use conductor_core::dto::log::{JobLogs, NewLogLine};
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};
use crate::repository::{JobRepository, LogRepository};

/// Most lines accepted in a single batch
pub const MAX_BATCH_LINES: usize = 1000;

/// Longest accepted line, in characters
pub const MAX_LINE_CHARS: usize = 10_000;

pub struct LogService {
    jobs: Arc<dyn JobRepository>,
    logs: Arc<dyn LogRepository>,
}

impl LogService {
    pub fn new(jobs: Arc<dyn JobRepository>, logs: Arc<dyn LogRepository>) -> Self {
        Self { jobs, logs }
    }

    /// Appends one line and returns its number
    pub async fn append(&self, job_id: i64, line: NewLogLine) -> Result<i64> {
        validate_line(&line)?;
        self.ensure_job(job_id).await?;

        Ok(self.logs.append(job_id, line).await?)
    }

    /// Appends lines in order; an empty batch stores nothing
    pub async fn append_batch(&self, job_id: i64, lines: Vec<NewLogLine>) -> Result<Vec<i64>> {
        validate_batch(&lines)?;
        self.ensure_job(job_id).await?;

        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let count = lines.len();
        let numbers = self.logs.append_batch(job_id, lines).await?;
        tracing::debug!("Stored {} log lines for job {}", count, job_id);

        Ok(numbers)
    }

    /// Lines from `start_line` (default 0), at most `limit` of them (default all)
    pub async fn read(
        &self,
        job_id: i64,
        start_line: Option<i64>,
        limit: Option<i64>,
    ) -> Result<JobLogs> {
        let start_line = start_line.unwrap_or(0);
        if start_line < 0 {
            return Err(OrchestratorError::Validation(
                "start_line must not be negative".to_string(),
            ));
        }
        if limit.is_some_and(|l| l < 0) {
            return Err(OrchestratorError::Validation(
                "limit must not be negative".to_string(),
            ));
        }

        self.ensure_job(job_id).await?;

        let logs = self.logs.read(job_id, start_line, limit).await?;
        let total_lines = self.logs.count(job_id).await?;

        Ok(JobLogs {
            job_id,
            returned_lines: logs.len(),
            logs,
            total_lines,
        })
    }

    pub async fn count(&self, job_id: i64) -> Result<i64> {
        self.ensure_job(job_id).await?;
        Ok(self.logs.count(job_id).await?)
    }

    async fn ensure_job(&self, job_id: i64) -> Result<()> {
        match self.jobs.find_by_id(job_id).await? {
            Some(_) => Ok(()),
            None => Err(OrchestratorError::job_not_found(job_id)),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_line(line: &NewLogLine) -> Result<()> {
    let chars = line.content.chars().count();
    if chars > MAX_LINE_CHARS {
        return Err(OrchestratorError::Validation(format!(
            "log line has {} characters, at most {} are allowed",
            chars, MAX_LINE_CHARS
        )));
    }
    Ok(())
}

fn validate_batch(lines: &[NewLogLine]) -> Result<()> {
    if lines.len() > MAX_BATCH_LINES {
        return Err(OrchestratorError::Validation(format!(
            "batch has {} lines, at most {} are allowed",
            lines.len(),
            MAX_BATCH_LINES
        )));
    }
    lines.iter().try_for_each(validate_line)
}
