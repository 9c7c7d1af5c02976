//! Log DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::log::{LogLine, Severity};

/// A line of output to append; the orchestrator assigns its number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogLine {
    pub content: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl NewLogLine {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Log batch sent from a worker to the orchestrator, in emission order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    pub lines: Vec<NewLogLine>,
}

/// Line numbers assigned to an appended batch, in the batch's order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendedLines {
    pub line_numbers: Vec<i64>,
}

/// A window of a job's log stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogs {
    pub job_id: i64,
    pub logs: Vec<LogLine>,
    pub total_lines: i64,
    pub returned_lines: usize,
}
