//! Escalation Service
//!
//! Opens tickets against jobs. Whether a job deserves a ticket is the caller's
//! call; any existing job can be escalated, whatever its status.

use conductor_core::domain::audit::{AuditAction, AuditEvent};
use conductor_core::domain::ticket::Ticket;
use conductor_core::dto::ticket::CreateTicket;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::repository::{AuditSink, JobRepository, NewTicket, TicketRepository};

const MAX_TITLE_CHARS: usize = 255;

pub struct EscalationService {
    jobs: Arc<dyn JobRepository>,
    tickets: Arc<dyn TicketRepository>,
    audit: Arc<dyn AuditSink>,
}

impl EscalationService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        tickets: Arc<dyn TicketRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            jobs,
            tickets,
            audit,
        }
    }

    /// Opens a ticket referencing `job_id`
    pub async fn create_from_job(
        &self,
        job_id: i64,
        principal_id: i64,
        req: CreateTicket,
    ) -> Result<Ticket> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(OrchestratorError::Validation(
                "ticket title is required".to_string(),
            ));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(OrchestratorError::Validation(format!(
                "ticket title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }

        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::job_not_found(job_id))?;

        let description = req
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Auto-generated ticket for job {}", job.token));

        let ticket = self
            .tickets
            .insert(NewTicket {
                token: Uuid::new_v4(),
                job_id,
                created_by: principal_id,
                title: title.to_string(),
                description: Some(description),
                priority: req.priority,
            })
            .await?;

        tracing::info!(
            "Ticket {} opened for job {} with priority {}",
            ticket.token,
            job_id,
            ticket.priority
        );

        let event = AuditEvent::job(
            Some(principal_id),
            AuditAction::CreateTicket,
            job_id,
            json!({ "ticket_token": ticket.token, "job_token": job.token }),
        );
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!("Failed to record ticket audit event for job {}: {}", job_id, e);
        }

        Ok(ticket)
    }

    pub async fn get(&self, token: Uuid) -> Result<Ticket> {
        self.tickets
            .find_by_token(token)
            .await?
            .ok_or_else(|| OrchestratorError::Reference(format!("Ticket {} not found", token)))
    }
}
