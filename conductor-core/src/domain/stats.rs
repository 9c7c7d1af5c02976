//! Job statistics

use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// Number of jobs in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub success: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    /// Adds `count` jobs to the bucket for `status`
    pub fn add(&mut self, status: JobStatus, count: i64) {
        let bucket = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Success => &mut self.success,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        };
        *bucket += count;
    }

    pub fn total(&self) -> i64 {
        self.pending + self.running + self.success + self.failed + self.cancelled
    }
}

/// Point-in-time job statistics
///
/// `success_rate` is the percentage of jobs that did not fail, rounded to two
/// decimals, and 0 when there are no jobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub success: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub success_rate: f64,
}

impl From<StatusCounts> for JobStatistics {
    fn from(counts: StatusCounts) -> Self {
        let total = counts.total();
        let success_rate = if total > 0 {
            let rate = (total - counts.failed) as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total,
            pending: counts.pending,
            running: counts.running,
            success: counts.success,
            failed: counts.failed,
            cancelled: counts.cancelled,
            success_rate,
        }
    }
}
