//! Job DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::JobStatus;

/// Request to create a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub script_id: i64,
    pub target_id: i64,
    #[serde(default)]
    pub extra_parameters: HashMap<String, serde_json::Value>,
}

/// Status callback from a worker to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Optional filters for listing jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub script_id: Option<i64>,
    pub target_id: Option<i64>,
    pub principal_id: Option<i64>,
}

/// Which page of a listing to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Builds a request from optional query values, clamping out-of-range input
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Number of rows to skip
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = request.per_page as i64;
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            pages: (total + per_page - 1) / per_page,
        }
    }
}
