//! Escalation ticket endpoints

use conductor_core::domain::ticket::Ticket;
use conductor_core::dto::ticket::CreateTicket;
use reqwest::Method;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Open a ticket against a job
    pub async fn create_ticket(&self, job_id: i64, req: CreateTicket) -> Result<Ticket> {
        let path = format!("/api/jobs/{}/ticket", job_id);
        let response = self.request(Method::POST, &path).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_ticket(&self, token: Uuid) -> Result<Ticket> {
        let path = format!("/api/tickets/{}", token);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_response(response).await
    }
}
