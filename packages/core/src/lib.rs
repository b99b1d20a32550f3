//! Core domain types for the job throttle.
//!
//! This crate contains shared types used across all packages:
//! - JobId, JobState and outcomes for units of work
//! - ConcurrencyCap, QueueStats and DrainReport for named queues
//! - Events for progress reporting

mod events;
mod job;
mod queue;

pub use events::ThrottleEvent;
pub use job::{JobId, JobOutcome, JobResult, JobSnapshot, JobState, ReapedJob, WorkExecutionError};
pub use queue::{ConcurrencyCap, DEFAULT_CONCURRENCY_CAP, DrainReport, ParseCapError, QueueStats};
