//! Conductor HTTP Client
//!
//! A simple, type-safe HTTP client for communicating with the Conductor orchestrator API.
//!
//! The CLI uses it to submit and inspect jobs; execution workers use it to deliver
//! status and log callbacks.
//!
//! # Example
//!
//! ```no_run
//! use conductor_client::OrchestratorClient;
//! use conductor_core::domain::principal::{Principal, Role};
//! use conductor_core::dto::job::CreateJob;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080")
//!         .with_principal(Principal::new(1, Role::User));
//!
//!     let job = client.create_job(CreateJob {
//!         script_id: 1,
//!         target_id: 1,
//!         extra_parameters: Default::default(),
//!     }).await?;
//!
//!     println!("Created job: {}", job.token);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod logs;
mod tickets;

// Re-export commonly used types
pub use error::{ClientError, Result};

use conductor_core::domain::principal::Principal;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the caller's principal id
pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
/// Header carrying the caller's role
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";

/// HTTP client for the Conductor orchestrator API
///
/// This client provides methods for all orchestrator API endpoints, organized
/// into logical groups:
/// - Job lifecycle (create, list, get, dispatch, cancel, statistics)
/// - Worker callbacks (status reports, log batches)
/// - Escalation tickets
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Identity forwarded on every request
    principal: Option<Principal>,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use conductor_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            principal: None,
        }
    }

    /// Sends `principal` as the caller identity on every request
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a request to `path` under the base URL, with identity headers
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);

        match &self.principal {
            Some(principal) => builder
                .header(PRINCIPAL_ID_HEADER, principal.id.to_string())
                .header(PRINCIPAL_ROLE_HEADER, principal.role.as_str()),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator answered {}: {}", status, body);
            return Err(ClientError::from_body(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
