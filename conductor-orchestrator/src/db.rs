use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
}

/// Idempotent schema statements, applied in order at startup.
///
/// `scripts` and `targets` belong to the definition store and target registry;
/// they are created here only so jobs can reference them.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scripts (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL UNIQUE,
        description TEXT,
        file_path VARCHAR(500) NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS targets (
        id BIGSERIAL PRIMARY KEY,
        hostname VARCHAR(255) NOT NULL UNIQUE,
        address VARCHAR(45) NOT NULL,
        port INTEGER NOT NULL DEFAULT 22,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id BIGSERIAL PRIMARY KEY,
        token UUID NOT NULL UNIQUE,
        script_id BIGINT NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
        target_id BIGINT NOT NULL REFERENCES targets(id),
        principal_id BIGINT NOT NULL,
        status VARCHAR(20) NOT NULL
            CHECK (status IN ('pending', 'running', 'success', 'failed', 'cancelled')),
        worker_handle VARCHAR(255),
        error_message TEXT,
        extra_parameters JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_principal_status ON jobs(principal_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_script_id ON jobs(script_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_target_id ON jobs(target_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS job_logs (
        id BIGSERIAL PRIMARY KEY,
        job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        line_number BIGINT NOT NULL,
        content TEXT NOT NULL,
        severity VARCHAR(20) NOT NULL,
        captured_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_job_logs_job_line ON job_logs(job_id, line_number)",
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id BIGSERIAL PRIMARY KEY,
        token UUID NOT NULL UNIQUE,
        job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        created_by BIGINT NOT NULL,
        title VARCHAR(255) NOT NULL,
        description TEXT,
        status VARCHAR(20) NOT NULL DEFAULT 'open',
        priority VARCHAR(20) NOT NULL DEFAULT 'medium',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        resolved_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tickets_status_priority ON tickets(status, priority)",
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id BIGSERIAL PRIMARY KEY,
        principal_id BIGINT,
        action VARCHAR(100) NOT NULL,
        resource_type VARCHAR(50) NOT NULL,
        resource_id BIGINT NOT NULL,
        details JSONB,
        timestamp TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_logs(resource_type, resource_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_action_timestamp ON audit_logs(action, timestamp)",
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
