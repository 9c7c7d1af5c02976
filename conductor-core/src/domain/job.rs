//! Job domain types
//!
//! A job moves through `pending -> running -> {success, failed, cancelled}`.
//! The transition rules below are the single authority on that lifecycle; the
//! orchestrator only decides *when* to ask them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Job execution record
///
/// Structure shared between orchestrator (persists) and clients (display).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Sequential storage key
    pub id: i64,
    /// Random token that is safe to display or share
    pub token: Uuid,
    pub script_id: i64,
    pub target_id: i64,
    pub principal_id: i64,
    pub status: JobStatus,
    /// Opaque reference returned by the worker pool once dispatch succeeded
    pub worker_handle: Option<String>,
    pub error_message: Option<String>,
    pub extra_parameters: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// What applying a reported status to a job amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job moves to the new status
    Advance,
    /// The job is already in the reported status; nothing changes
    Unchanged,
}

/// A status change the lifecycle does not permit
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move job from {from} to {to}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Terminal statuses admit no further transition
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Checks a worker-reported status against the lifecycle.
    ///
    /// Re-delivery of the current status is always accepted as a no-op, since
    /// worker callbacks arrive at least once. Anything leaving a terminal status,
    /// and `running -> pending`, is rejected.
    pub fn check_transition(self, to: JobStatus) -> Result<Transition, IllegalTransition> {
        use JobStatus::*;

        if self == to {
            return Ok(Transition::Unchanged);
        }

        match (self, to) {
            (Pending, Running | Success | Failed | Cancelled)
            | (Running, Success | Failed | Cancelled) => Ok(Transition::Advance),
            _ => Err(IllegalTransition { from: self, to }),
        }
    }

    /// Checks whether a user may cancel a job in this status.
    ///
    /// Cancelling a failed job is allowed and overrides the failure.
    pub fn check_cancel(self) -> Result<(), IllegalTransition> {
        match self {
            JobStatus::Pending | JobStatus::Running | JobStatus::Failed => Ok(()),
            JobStatus::Success | JobStatus::Cancelled => Err(IllegalTransition {
                from: self,
                to: JobStatus::Cancelled,
            }),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("job status", s))
    }
}
