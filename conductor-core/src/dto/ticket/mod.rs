//! Ticket DTOs

use serde::{Deserialize, Serialize};

use crate::domain::ticket::TicketPriority;

/// Request to escalate a job into a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicket {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
}
