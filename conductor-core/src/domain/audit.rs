//! Audit trail events
//!
//! Events are append-only and best-effort: emitting one never gates the job
//! mutation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Dispatch,
    DispatchFailed,
    Cancel,
    CreateTicket,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Dispatch => "DISPATCH",
            AuditAction::DispatchFailed => "DISPATCH_FAILED",
            AuditAction::Cancel => "CANCEL",
            AuditAction::CreateTicket => "CREATE_TICKET",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// `None` for system-initiated actions
    pub principal_id: Option<i64>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: i64,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Event about a job, stamped with the current time
    pub fn job(
        principal_id: Option<i64>,
        action: AuditAction,
        job_id: i64,
        details: serde_json::Value,
    ) -> Self {
        Self {
            principal_id,
            action,
            resource_type: "job".to_string(),
            resource_id: job_id,
            details,
            timestamp: Utc::now(),
        }
    }
}
