use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod repository;
pub mod service;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::config::Config;
use crate::dispatch::HttpDispatchGateway;
use crate::repository::{PgAuditSink, PgJobRepository, PgLogRepository, PgRegistry, PgTicketRepository};
use crate::service::{EscalationService, JobOrchestrator, LogService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conductor_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conductor Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let gateway = HttpDispatchGateway::new(&config.worker_pool_url, config.dispatch_timeout)
        .context("Failed to build worker pool client")?;

    tracing::info!("Dispatching to worker pool at {}", config.worker_pool_url);

    // Wire services
    let jobs = Arc::new(PgJobRepository::new(pool.clone()));
    let registry = Arc::new(PgRegistry::new(pool.clone()));
    let audit = Arc::new(PgAuditSink::new(pool.clone()));

    let orchestrator = JobOrchestrator::new(
        jobs.clone(),
        registry.clone(),
        registry,
        Arc::new(gateway),
        audit.clone(),
        config.dispatch_timeout,
    );
    let logs = LogService::new(jobs.clone(), Arc::new(PgLogRepository::new(pool.clone())));
    let escalation = EscalationService::new(jobs, Arc::new(PgTicketRepository::new(pool)), audit);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        logs: Arc::new(logs),
        escalation: Arc::new(escalation),
        retry: config.retry_policy(),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
