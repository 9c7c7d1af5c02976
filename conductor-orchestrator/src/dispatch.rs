//! Dispatch Gateway
//!
//! The only component that knows how the execution worker pool is reached.
//! It turns a pending job into a unit of work and hands it over, and it relays
//! termination requests for cancelled jobs.

use async_trait::async_trait;
use conductor_core::domain::registry::{ScriptRef, TargetRef};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DispatchError;

/// Work handed to the execution worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub job_id: i64,
    pub job_token: Uuid,
    pub script: ScriptSpec,
    pub target: TargetSpec,
    pub extra_parameters: HashMap<String, serde_json::Value>,
}

/// Script reference as the worker sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub id: i64,
    pub name: String,
}

/// Connection parameters of the target host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub id: i64,
    pub hostname: String,
    pub address: String,
    pub port: u16,
}

impl From<&ScriptRef> for ScriptSpec {
    fn from(script: &ScriptRef) -> Self {
        Self {
            id: script.id,
            name: script.name.clone(),
        }
    }
}

impl From<&TargetRef> for TargetSpec {
    fn from(target: &TargetRef) -> Self {
        Self {
            id: target.id,
            hostname: target.hostname.clone(),
            address: target.address.clone(),
            port: target.port,
        }
    }
}

#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Hands the unit of work to the worker pool and returns its handle
    async fn enqueue(&self, unit: WorkUnit) -> Result<String, DispatchError>;

    /// Asks the worker pool to stop a unit of work.
    ///
    /// Never fails: delivery problems are logged and otherwise ignored.
    async fn request_termination(&self, handle: &str);
}

#[derive(Debug, Deserialize)]
struct EnqueueResponse {
    handle: String,
}

/// Talks to the worker pool over HTTP
#[derive(Debug, Clone)]
pub struct HttpDispatchGateway {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpDispatchGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        let base_url = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    /// `{base}/units/{handle}/terminate` with the handle encoded as one path segment
    fn termination_url(&self, handle: &str) -> Option<Url> {
        let mut url = Url::parse(&self.base_url).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["units", handle, "terminate"]);
        Some(url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::TimedOut(self.timeout)
        } else {
            DispatchError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl DispatchGateway for HttpDispatchGateway {
    async fn enqueue(&self, unit: WorkUnit) -> Result<String, DispatchError> {
        let url = format!("{}/units", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&unit)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "no response body".to_string());
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: EnqueueResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Unreachable(format!("malformed enqueue response: {e}")))?;

        tracing::debug!("Job {} enqueued as {}", unit.job_id, body.handle);

        Ok(body.handle)
    }

    async fn request_termination(&self, handle: &str) {
        let Some(url) = self.termination_url(handle) else {
            tracing::warn!(
                "Cannot build termination URL for {} from {}",
                handle,
                self.base_url
            );
            return;
        };

        match self.client.post(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Termination requested for worker unit {}", handle);
            }
            Ok(response) => {
                tracing::warn!(
                    "Worker pool refused termination of {} (status {})",
                    handle,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!("Failed to request termination of {}: {}", handle, e);
            }
        }
    }
}
