//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod ticket;

pub use job::JobCommands;
pub use ticket::TicketCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Escalation tickets
    Ticket {
        #[command(subcommand)]
        command: TicketCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Ticket { command } => ticket::handle_ticket_command(command, config).await,
    }
}
