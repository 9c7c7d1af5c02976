//! Ticket command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use conductor_core::domain::ticket::{Ticket, TicketPriority};
use conductor_core::dto::ticket::CreateTicket;
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::JobRef;

/// Ticket subcommands
#[derive(Subcommand)]
pub enum TicketCommands {
    /// Escalate a job into a ticket
    Create {
        /// Job id, token, or unambiguous token prefix
        job: String,

        #[arg(short, long)]
        title: String,

        /// Defaults to a note naming the job
        #[arg(short, long)]
        description: Option<String>,

        /// low, medium, high or critical
        #[arg(short, long, default_value = "medium")]
        priority: TicketPriority,
    },
    /// Get ticket details
    Get {
        /// Ticket token
        token: String,
    },
}

pub async fn handle_ticket_command(command: TicketCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        TicketCommands::Create {
            job,
            title,
            description,
            priority,
        } => {
            let job_id = resolve_job_id(&client, &JobRef::parse(&job)).await?;
            let ticket = client
                .create_ticket(
                    job_id,
                    CreateTicket {
                        title,
                        description,
                        priority,
                    },
                )
                .await?;

            println!("{}", "✓ Ticket created".green().bold());
            println!();
            print_ticket_details(&ticket);
            Ok(())
        }
        TicketCommands::Get { token } => {
            let token = Uuid::parse_str(token.trim())
                .with_context(|| format!("'{}' is not a ticket token", token))?;
            let ticket = client.get_ticket(token).await?;
            print_ticket_details(&ticket);
            Ok(())
        }
    }
}

fn print_ticket_details(ticket: &Ticket) {
    let priority = ticket.priority.as_str();
    let priority_colored = match ticket.priority {
        TicketPriority::Low => priority.dimmed(),
        TicketPriority::Medium => priority.normal(),
        TicketPriority::High => priority.yellow(),
        TicketPriority::Critical => priority.red().bold(),
    };

    println!("{}", "Ticket Details:".bold());
    println!("  Token:       {}", ticket.token.to_string().cyan());
    println!("  Job:         {}", ticket.job_id);
    println!("  Title:       {}", ticket.title.bold());
    println!("  Status:      {}", ticket.status);
    println!("  Priority:    {}", priority_colored);
    println!("  Created by:  {}", ticket.created_by);
    println!(
        "  Created:     {}",
        ticket.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(resolved) = ticket.resolved_at {
        println!("  Resolved:    {}", resolved.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(description) = &ticket.description {
        println!("\n{}", "Description:".bold());
        println!("{}", description);
    }
}
