//! ID resolver module
//!
//! Turns whatever the user typed into a sequential job id. Token prefixes are
//! resolved by scanning the job listing, newest first.

use anyhow::{Context, Result, anyhow};
use conductor_client::OrchestratorClient;
use conductor_core::dto::job::{JobFilter, PageRequest};

use crate::types::JobRef;

/// Resolve a job reference to its sequential id
///
/// # Errors
/// Returns an error if:
/// - No job matches the token or prefix
/// - Multiple jobs match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_job_id(client: &OrchestratorClient, job: &JobRef) -> Result<i64> {
    match job {
        JobRef::Id(id) => Ok(*id),
        JobRef::Token(token) => {
            let job = client
                .get_job_by_token(*token)
                .await
                .with_context(|| format!("No job found with token {}", token))?;
            Ok(job.id)
        }
        JobRef::TokenPrefix(prefix) => resolve_prefix(client, prefix).await,
    }
}

async fn resolve_prefix(client: &OrchestratorClient, prefix: &str) -> Result<i64> {
    let mut matches = Vec::new();
    let mut page = PageRequest::new(Some(1), Some(PageRequest::MAX_PER_PAGE));

    loop {
        let listing = client
            .list_jobs(&JobFilter::default(), page)
            .await
            .context("Failed to fetch jobs for ID resolution")?;

        matches.extend(
            listing
                .items
                .iter()
                .filter(|j| j.token.to_string().starts_with(prefix))
                .map(|j| (j.id, j.token)),
        );

        if i64::from(page.page) >= listing.pages || matches.len() > 1 {
            break;
        }
        page.page += 1;
    }

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with token starting with '{}'", prefix)),
        [(id, _)] => Ok(*id),
        _ => {
            let tokens: Vec<String> = matches.iter().map(|(_, t)| t.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                prefix,
                tokens.join(", ")
            ))
        }
    }
}
