//! Error types shared by the orchestrator's services and repositories

use conductor_core::domain::job::IllegalTransition;
use std::time::Duration;
use thiserror::Error;

/// Failure in the durability layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode or decode column: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The worker pool could not be reached or refused the unit of work
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker pool unreachable: {0}")]
    Unreachable(String),

    #[error("worker pool rejected the unit of work (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("worker pool did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Outcome of a rejected orchestrator operation
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A referenced script, target or job is missing or inactive
    #[error("{0}")]
    Reference(String),

    #[error("job {job_id}: {source}")]
    InvalidTransition {
        job_id: i64,
        #[source]
        source: IllegalTransition,
    },

    /// Conflicting concurrent writes to the same job
    #[error("{0}")]
    Conflict(String),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl OrchestratorError {
    pub fn job_not_found(job_id: i64) -> Self {
        Self::Reference(format!("Job {} not found", job_id))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
