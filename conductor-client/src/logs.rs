//! Log stream endpoints

use conductor_core::dto::log::{AppendedLines, JobLogs, LogBatch, NewLogLine};
use reqwest::Method;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Send output lines for a job, in emission order
    ///
    /// Returns the line numbers the orchestrator assigned.
    pub async fn append_logs(&self, job_id: i64, lines: Vec<NewLogLine>) -> Result<Vec<i64>> {
        let path = format!("/api/jobs/{}/logs", job_id);
        let response = self
            .request(Method::POST, &path)
            .json(&LogBatch { lines })
            .send()
            .await?;

        let appended: AppendedLines = self.handle_response(response).await?;
        Ok(appended.line_numbers)
    }

    /// Read a window of a job's log stream
    ///
    /// `start_line` defaults to the first line and `limit` to the whole stream.
    pub async fn job_logs(
        &self,
        job_id: i64,
        start_line: Option<i64>,
        limit: Option<i64>,
    ) -> Result<JobLogs> {
        let path = format!("/api/jobs/{}/logs", job_id);
        let mut request = self.request(Method::GET, &path);
        if let Some(start) = start_line {
            request = request.query(&[("start_line", start)]);
        }
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }
}
