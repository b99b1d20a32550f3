//! Message types for queue actor communication.

use ractor::RpcReplyPort;
use throttle_core::{ConcurrencyCap, JobId, JobSnapshot, QueueStats, ReapedJob};

use crate::error::JobCreationError;
use crate::work::Work;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Reap, then start `work` if the cap allows it.
    Admit {
        work: Box<Work>,
        cap: ConcurrencyCap,
        reply: RpcReplyPort<Result<Admission, JobCreationError>>,
    },

    /// Reap terminal jobs, replying with how many were removed.
    Reap { reply: RpcReplyPort<usize> },

    /// Hand out reaped outcomes collected so far.
    TakeOutcomes { reply: RpcReplyPort<Vec<ReapedJob>> },

    /// Abort a live job.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// List live jobs in insertion order.
    ListJobs { reply: RpcReplyPort<Vec<JobSnapshot>> },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },
}

/// Answer to an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// The work was started.
    Admitted(JobId),
    /// The queue is full; the work is handed back for a later attempt.
    AtCapacity { occupancy: usize, work: Box<Work> },
}
