//! Job domain types for units of throttled work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, task not yet polled.
    #[default]
    Pending,
    /// Work (or its initializer) is executing.
    Running,
    /// Work returned a value.
    Completed,
    /// Work, or its initializer, returned an error or panicked.
    Failed,
    /// Work was aborted before it finished.
    Stopped,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }

    /// Get a simple state string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// Failure of a submitted unit of work.
///
/// These are data, not control flow: they are attached to the reaped job
/// and handed to whoever consumes the outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum WorkExecutionError {
    #[error("work failed: {0}")]
    Failed(String),

    #[error("initializer failed: {0}")]
    InitFailed(String),

    #[error("work panicked: {0}")]
    Panicked(String),

    #[error("work stopped before completion")]
    Stopped,
}

impl WorkExecutionError {
    /// Terminal state a job ends up in when it fails this way.
    pub fn state(&self) -> JobState {
        match self {
            WorkExecutionError::Stopped => JobState::Stopped,
            _ => JobState::Failed,
        }
    }
}

/// Terminal result of a job, taken exactly once at reap time.
pub type JobOutcome = Result<JobResult, WorkExecutionError>;

/// A job that has been removed from its queue together with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReapedJob {
    pub job_id: JobId,
    /// Name of the queue the job was submitted under.
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub outcome: JobOutcome,
    pub submitted_at: DateTime<Utc>,
    pub reaped_at: DateTime<Utc>,
}

impl ReapedJob {
    /// Terminal state derived from the outcome.
    pub fn state(&self) -> JobState {
        match &self.outcome {
            Ok(_) => JobState::Completed,
            Err(e) => e.state(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The error, if the work did not complete.
    pub fn error(&self) -> Option<&WorkExecutionError> {
        self.outcome.as_ref().err()
    }
}

/// Point-in-time view of a live (not yet reaped) job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
}
