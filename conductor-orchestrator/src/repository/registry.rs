//! Script and target registries
//!
//! Read-only lookups into tables owned by the definition store and the target
//! registry.

use async_trait::async_trait;
use conductor_core::domain::registry::{ScriptRef, TargetRef};
use sqlx::PgPool;

use crate::error::StorageError;

#[async_trait]
pub trait ScriptRegistry: Send + Sync {
    async fn lookup(&self, id: i64) -> Result<Option<ScriptRef>, StorageError>;
}

#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn lookup(&self, id: i64) -> Result<Option<TargetRef>, StorageError>;
}

/// Postgres-backed lookups for both registries
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScriptRegistry for PgRegistry {
    async fn lookup(&self, id: i64) -> Result<Option<ScriptRef>, StorageError> {
        let row: Option<(i64, String, bool)> =
            sqlx::query_as("SELECT id, name, is_active FROM scripts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, name, active)| ScriptRef { id, name, active }))
    }
}

#[async_trait]
impl TargetRegistry for PgRegistry {
    async fn lookup(&self, id: i64) -> Result<Option<TargetRef>, StorageError> {
        let row: Option<(i64, String, String, i32, bool)> = sqlx::query_as(
            "SELECT id, hostname, address, port, is_active FROM targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, hostname, address, port, active)| {
            let port = u16::try_from(port)
                .map_err(|_| StorageError::InvalidRow(format!("target {id} has port {port}")))?;
            Ok(TargetRef {
                id,
                hostname,
                address,
                port,
                active,
            })
        })
        .transpose()
    }
}
