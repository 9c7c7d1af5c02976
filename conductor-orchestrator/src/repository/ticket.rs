//! Ticket Repository
//!
//! Handles all database operations related to escalation tickets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::domain::ticket::{Ticket, TicketPriority, TicketStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StorageError;

/// Fields of a ticket about to be opened
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub token: Uuid,
    pub job_id: i64,
    pub created_by: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Stores a new ticket in `open`
    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StorageError>;

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Ticket>, StorageError>;
}

/// Postgres implementation of TicketRepository
#[derive(Clone)]
pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StorageError> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            INSERT INTO tickets (token, job_id, created_by, title, description, status, priority, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id, token, job_id, created_by, title, description, status, priority,
                      created_at, updated_at, resolved_at
            "#,
        )
        .bind(ticket.token)
        .bind(ticket.job_id)
        .bind(ticket.created_by)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(TicketStatus::Open.as_str())
        .bind(ticket.priority.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Ticket>, StorageError> {
        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, token, job_id, created_by, title, description, status, priority,
                   created_at, updated_at, resolved_at
            FROM tickets
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Ticket::try_from).transpose()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    token: Uuid,
    job_id: i64,
    created_by: i64,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StorageError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let invalid = |e: conductor_core::domain::UnknownVariant| StorageError::InvalidRow(e.to_string());

        Ok(Ticket {
            id: row.id,
            token: row.token,
            job_id: row.job_id,
            created_by: row.created_by,
            title: row.title,
            description: row.description,
            status: row.status.parse().map_err(invalid)?,
            priority: row.priority.parse().map_err(invalid)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}
