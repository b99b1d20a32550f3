//! Error types for the throttle.

use std::time::Duration;

/// The execution substrate refused to start a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobCreationError {
    #[error("no async runtime available to run the job")]
    NoRuntime,

    #[error("live job limit of {limit} reached")]
    Exhausted { limit: usize },
}

/// Result type for throttle operations.
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Error type for throttle operations.
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("Job creation failed: {0}")]
    JobCreation(#[from] JobCreationError),

    #[error("Queue actor error: {0}")]
    Actor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Admission to queue '{queue}' timed out after {waited:?} ({occupancy} live jobs)")]
    AdmissionTimedOut {
        queue: String,
        occupancy: usize,
        waited: Duration,
    },

    #[error("Drain of queue '{queue}' timed out after {waited:?} ({occupancy} live jobs)")]
    DrainTimedOut {
        queue: String,
        occupancy: usize,
        waited: Duration,
    },
}
