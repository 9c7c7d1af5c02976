//! Audit sink
//!
//! Append-only record of job actions. Callers treat a failed write as a
//! warning, never as a reason to undo the action itself.

use async_trait::async_trait;
use conductor_core::domain::audit::AuditEvent;
use sqlx::PgPool;

use crate::error::StorageError;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), StorageError>;
}

/// Writes audit events to the `audit_logs` table
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (principal_id, action, resource_type, resource_id, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.principal_id)
        .bind(event.action.as_str())
        .bind(&event.resource_type)
        .bind(event.resource_id)
        .bind(&event.details)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
