//! Event types for progress and diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConcurrencyCap, JobId, JobState};

/// Events emitted by the throttle. Advisory only, they never steer control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ThrottleEvent {
    // Queue events
    /// A registry entry was created for a queue name.
    QueueCreated {
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// Admission was refused because the queue is at its cap.
    CapacityExceeded {
        queue: String,
        occupancy: usize,
        cap: ConcurrencyCap,
        timestamp: DateTime<Utc>,
    },
    /// A drain is still waiting on live jobs.
    QueueDraining {
        queue: String,
        occupancy: usize,
        timestamp: DateTime<Utc>,
    },
    /// A drain finished and the queue is empty.
    QueueDrained {
        queue: String,
        reaped: usize,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job was admitted and its task spawned.
    JobStarted {
        job_id: JobId,
        queue: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A terminal job was removed from its queue.
    JobReaped {
        job_id: JobId,
        queue: String,
        state: JobState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A job's task was aborted on request.
    JobCancelled {
        job_id: JobId,
        queue: String,
        timestamp: DateTime<Utc>,
    },
}

impl ThrottleEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ThrottleEvent::QueueCreated { timestamp, .. } => *timestamp,
            ThrottleEvent::CapacityExceeded { timestamp, .. } => *timestamp,
            ThrottleEvent::QueueDraining { timestamp, .. } => *timestamp,
            ThrottleEvent::QueueDrained { timestamp, .. } => *timestamp,
            ThrottleEvent::JobStarted { timestamp, .. } => *timestamp,
            ThrottleEvent::JobReaped { timestamp, .. } => *timestamp,
            ThrottleEvent::JobCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue name associated with this event.
    pub fn queue(&self) -> &str {
        match self {
            ThrottleEvent::QueueCreated { queue, .. }
            | ThrottleEvent::CapacityExceeded { queue, .. }
            | ThrottleEvent::QueueDraining { queue, .. }
            | ThrottleEvent::QueueDrained { queue, .. }
            | ThrottleEvent::JobStarted { queue, .. }
            | ThrottleEvent::JobReaped { queue, .. }
            | ThrottleEvent::JobCancelled { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            ThrottleEvent::JobStarted { job_id, .. } => Some(*job_id),
            ThrottleEvent::JobReaped { job_id, .. } => Some(*job_id),
            ThrottleEvent::JobCancelled { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            ThrottleEvent::QueueCreated { queue, .. } => format!("Queue '{}' created", queue),
            ThrottleEvent::CapacityExceeded {
                queue,
                occupancy,
                cap,
                ..
            } => format!("Queue '{}' at capacity ({}/{})", queue, occupancy, cap),
            ThrottleEvent::QueueDraining {
                queue, occupancy, ..
            } => format!("Queue '{}' draining, {} job(s) left", queue, occupancy),
            ThrottleEvent::QueueDrained { queue, reaped, .. } => {
                format!("Queue '{}' drained ({} reaped)", queue, reaped)
            }
            ThrottleEvent::JobStarted {
                job_id,
                queue,
                label,
                ..
            } => match label {
                Some(label) => format!("Job {} ({}) started on '{}'", job_id, label, queue),
                None => format!("Job {} started on '{}'", job_id, queue),
            },
            ThrottleEvent::JobReaped {
                job_id,
                state,
                error,
                ..
            } => match error {
                Some(error) => format!("Job {} reaped ({}): {}", job_id, state, error),
                None => format!("Job {} reaped ({})", job_id, state),
            },
            ThrottleEvent::JobCancelled { job_id, queue, .. } => {
                format!("Job {} on '{}' cancelled", job_id, queue)
            }
        }
    }
}
