//! Job command handlers
//!
//! Handles all job-related CLI commands including submission, listing,
//! lifecycle actions and accessing logs.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conductor_client::OrchestratorClient;
use conductor_core::domain::job::{Job, JobStatus};
use conductor_core::domain::log::{LogLine, Severity};
use conductor_core::domain::stats::JobStatistics;
use conductor_core::dto::job::{CreateJob, JobFilter, PageRequest};

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::{JobRef, parse_param};

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a job and hand it to a worker
    Submit {
        /// Script to run
        script_id: i64,

        /// Target to run it against
        target_id: i64,

        /// Extra parameter as key=value; values are parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },
    /// List jobs
    List {
        /// Only jobs in this status
        #[arg(long)]
        status: Option<JobStatus>,

        /// Only jobs running this script
        #[arg(long)]
        script: Option<i64>,

        /// Only jobs against this target
        #[arg(long)]
        target: Option<i64>,

        /// Only jobs owned by this principal
        #[arg(long)]
        principal: Option<i64>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = PageRequest::DEFAULT_PER_PAGE)]
        per_page: u32,
    },
    /// Get job details
    Get {
        /// Job id, token, or unambiguous token prefix
        id: String,
    },
    /// Dispatch a pending job to a worker
    Dispatch {
        /// Job id, token, or unambiguous token prefix
        id: String,
    },
    /// Cancel a job
    Cancel {
        /// Job id, token, or unambiguous token prefix
        id: String,
    },
    /// Show job counts per status
    Stats {
        /// Only jobs owned by this principal
        #[arg(long)]
        principal: Option<i64>,
    },
    /// Get job logs
    Logs {
        /// Job id, token, or unambiguous token prefix
        id: String,

        /// First line to show
        #[arg(long)]
        start: Option<i64>,

        /// Maximum number of lines to show
        #[arg(long)]
        limit: Option<i64>,

        /// Keep polling for new lines until the job finishes
        #[arg(short, long)]
        follow: bool,

        /// Polling interval in milliseconds when following
        #[arg(long, default_value_t = 1000)]
        interval: u64,
    },
}

/// Handle job commands
///
/// Routes job subcommands to their respective handlers.
///
/// # Arguments
/// * `command` - The job command to execute
/// * `config` - The CLI configuration
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Submit {
            script_id,
            target_id,
            params,
        } => submit_job(&client, script_id, target_id, params).await,
        JobCommands::List {
            status,
            script,
            target,
            principal,
            page,
            per_page,
        } => {
            let filter = JobFilter {
                status,
                script_id: script,
                target_id: target,
                principal_id: principal,
            };
            list_jobs(&client, &filter, PageRequest::new(Some(page), Some(per_page))).await
        }
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Dispatch { id } => dispatch_job(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
        JobCommands::Stats { principal } => show_statistics(&client, principal).await,
        JobCommands::Logs {
            id,
            start,
            limit,
            follow,
            interval,
        } => {
            let job_id = resolve_job_id(&client, &JobRef::parse(&id)).await?;
            if follow {
                follow_job_logs(&client, job_id, start, Duration::from_millis(interval)).await
            } else {
                get_job_logs(&client, job_id, start, limit).await
            }
        }
    }
}

/// Submit a new job
async fn submit_job(
    client: &OrchestratorClient,
    script_id: i64,
    target_id: i64,
    params: Vec<(String, serde_json::Value)>,
) -> Result<()> {
    let req = CreateJob {
        script_id,
        target_id,
        extra_parameters: params.into_iter().collect::<HashMap<_, _>>(),
    };

    let job = client.create_job(req).await?;

    println!("{}", "✓ Job submitted".green().bold());
    println!();
    print_job_details(&job);

    Ok(())
}

/// List jobs matching a filter
async fn list_jobs(
    client: &OrchestratorClient,
    filter: &JobFilter,
    page: PageRequest,
) -> Result<()> {
    let listing = client.list_jobs(filter, page).await?;

    if listing.items.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Found {} job(s), page {} of {}:",
            listing.total,
            listing.page,
            listing.pages.max(1)
        )
        .bold()
    );
    println!();
    for job in &listing.items {
        print_job_summary(job);
    }

    Ok(())
}

/// Get and display a single job
async fn get_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &JobRef::parse(id)).await?;

    let job = client.get_job(job_id).await?;

    print_job_details(&job);

    Ok(())
}

async fn dispatch_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &JobRef::parse(id)).await?;

    let job = client.dispatch_job(job_id).await?;

    println!("{}", "✓ Job dispatched".green().bold());
    if let Some(handle) = &job.worker_handle {
        println!("  Worker handle: {}", handle.cyan());
    }

    Ok(())
}

async fn cancel_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &JobRef::parse(id)).await?;

    let job = client.cancel_job(job_id).await?;

    println!(
        "{} Job {} is now {}",
        "✓".green(),
        job.id.to_string().cyan(),
        colorize_status(&job.status)
    );

    Ok(())
}

async fn show_statistics(client: &OrchestratorClient, principal: Option<i64>) -> Result<()> {
    let stats = client.job_statistics(principal).await?;
    print_statistics(&stats);
    Ok(())
}

/// Get and display a window of job logs
async fn get_job_logs(
    client: &OrchestratorClient,
    job_id: i64,
    start: Option<i64>,
    limit: Option<i64>,
) -> Result<()> {
    let logs = client.job_logs(job_id, start, limit).await?;

    if logs.logs.is_empty() {
        println!("{}", "No logs found for this job.".yellow());
    } else {
        println!(
            "{}",
            format!(
                "Logs for job {} ({} of {} lines):",
                job_id, logs.returned_lines, logs.total_lines
            )
            .bold()
        );
        println!("{}", "─".repeat(80).dimmed());
        for line in &logs.logs {
            print_log_entry(line);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

/// Stream logs until the job reaches a terminal status and no lines remain
async fn follow_job_logs(
    client: &OrchestratorClient,
    job_id: i64,
    start: Option<i64>,
    interval: Duration,
) -> Result<()> {
    let mut next_line = start.unwrap_or(0);

    println!("{}", format!("Following logs for job {}:", job_id).bold());
    println!("{}", "─".repeat(80).dimmed());

    loop {
        // Read the status first so lines written before the final status are not missed
        let job = client.get_job(job_id).await?;
        let logs = client.job_logs(job_id, Some(next_line), None).await?;

        for line in &logs.logs {
            print_log_entry(line);
        }
        next_line = next_cursor(next_line, &logs.logs);

        if job.status.is_terminal() && next_line >= logs.total_lines {
            println!("{}", "─".repeat(80).dimmed());
            println!("Job finished: {}", colorize_status(&job.status));
            if let Some(error) = &job.error_message {
                println!("{}", error.red());
            }
            return Ok(());
        }

        tokio::time::sleep(interval).await;
    }
}

/// Where the next poll should start reading
fn next_cursor(current: i64, lines: &[LogLine]) -> i64 {
    lines
        .last()
        .map(|line| line.line_number + 1)
        .unwrap_or(current)
        .max(current)
}

/// Print a job summary from a full Job object
fn print_job_summary(job: &Job) {
    let status_colored = colorize_status(&job.status);

    println!(
        "  {} Job {} {}",
        "▸".cyan(),
        job.id.to_string().bold(),
        job.token.to_string().dimmed()
    );
    println!("    Script:   {}", job.script_id);
    println!("    Target:   {}", job.target_id);
    println!("    Status:   {}", status_colored);
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(handle) = &job.worker_handle {
        println!("    Worker:   {}", handle.dimmed());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(job: &Job) {
    let status_colored = colorize_status(&job.status);

    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Token:       {}", job.token.to_string().dimmed());
    println!("  Script:      {}", job.script_id);
    println!("  Target:      {}", job.target_id);
    println!("  Owner:       {}", job.principal_id);
    println!("  Status:      {}", status_colored);
    println!(
        "  Created:     {}",
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = job.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(handle) = &job.worker_handle {
        println!("  Worker:      {}", handle);
    }

    if !job.extra_parameters.is_empty() {
        println!("\n{}", "Parameters:".bold());
        let mut keys: Vec<&String> = job.extra_parameters.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {} = {}", key.cyan(), job.extra_parameters[key]);
        }
    }

    if let Some(error) = &job.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_statistics(stats: &JobStatistics) {
    println!("{}", "Job Statistics:".bold());
    println!("  Total:       {}", stats.total.to_string().bold());
    println!("  Pending:     {}", stats.pending.to_string().yellow());
    println!("  Running:     {}", stats.running.to_string().cyan());
    println!("  Success:     {}", stats.success.to_string().green());
    println!("  Failed:      {}", stats.failed.to_string().red());
    println!("  Cancelled:   {}", stats.cancelled.to_string().dimmed());
    println!("  Success rate: {:.1}%", stats.success_rate);
}

/// Print a log line
fn print_log_entry(line: &LogLine) {
    let level_str = line.severity.as_str();
    let level_colored = match line.severity {
        Severity::Debug => level_str.dimmed(),
        Severity::Info => level_str.cyan(),
        Severity::Warning => level_str.yellow(),
        Severity::Error => level_str.red(),
    };

    println!(
        "{} {:>5} [{}] {}",
        line.captured_at.format("%H:%M:%S").to_string().dimmed(),
        line.line_number.to_string().dimmed(),
        level_colored,
        line.content
    );
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> colored::ColoredString {
    let status_str = status.as_str();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Success => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}
