//! Conductor CLI
//!
//! Command-line interface for interacting with the Conductor orchestrator.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use conductor_core::domain::principal::{Principal, Role};
use config::Config;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor job orchestration CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(long, env = "CONDUCTOR_URL", default_value = "http://localhost:8080")]
    orchestrator_url: String,

    /// Principal id to act as
    #[arg(long, env = "CONDUCTOR_PRINCIPAL_ID")]
    principal_id: i64,

    /// Role of the principal (user, admin, super_admin)
    #[arg(long, env = "CONDUCTOR_ROLE", default_value = "user")]
    role: Role,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
        principal: Principal::new(cli.principal_id, cli.role),
    };

    handle_command(cli.command, &config).await
}
