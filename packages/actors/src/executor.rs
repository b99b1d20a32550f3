//! Execution substrate: starts work asynchronously and tracks its lifecycle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use throttle_core::{JobId, JobOutcome, JobSnapshot, JobState, WorkExecutionError};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::error::JobCreationError;
use crate::work::{Runnable, Work};

/// Something that can start a unit of work asynchronously.
///
/// Implementations must move the job through `state` (Running once the
/// work starts, then Completed or Failed) and wake `completions` when the
/// task ends, whether it finished or was aborted.
pub trait Executor: Send + Sync + 'static {
    fn start(
        &self,
        runnable: Runnable,
        state: watch::Sender<JobState>,
        completions: Arc<Notify>,
    ) -> Result<JoinHandle<JobOutcome>, JobCreationError>;
}

/// Runs work as tasks on the current tokio runtime.
#[derive(Debug, Default)]
pub struct TokioExecutor {
    /// Process-wide cap on live tasks across every queue.
    max_live_jobs: Option<usize>,
    live: Arc<AtomicUsize>,
}

impl TokioExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to start more than `limit` tasks at once.
    pub fn with_max_live_jobs(mut self, limit: usize) -> Self {
        self.max_live_jobs = Some(limit);
        self
    }

    /// Number of tasks started by this executor that have not ended.
    pub fn live_jobs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn reserve(&self) -> Result<(), JobCreationError> {
        match self.max_live_jobs {
            Some(limit) => self
                .live
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                    (live < limit).then_some(live + 1)
                })
                .map(|_| ())
                .map_err(|_| JobCreationError::Exhausted { limit }),
            None => {
                self.live.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

impl Executor for TokioExecutor {
    fn start(
        &self,
        runnable: Runnable,
        state: watch::Sender<JobState>,
        completions: Arc<Notify>,
    ) -> Result<JoinHandle<JobOutcome>, JobCreationError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| JobCreationError::NoRuntime)?;
        self.reserve()?;

        let guard = TaskGuard {
            live: self.live.clone(),
            completions,
        };
        Ok(runtime.spawn(run_job(runnable, state, guard)))
    }
}

/// Releases the live slot and wakes waiters when a task ends or is dropped.
struct TaskGuard {
    live: Arc<AtomicUsize>,
    completions: Arc<Notify>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.completions.notify_waiters();
    }
}

async fn run_job(
    runnable: Runnable,
    state: watch::Sender<JobState>,
    _guard: TaskGuard,
) -> JobOutcome {
    state.send_replace(JobState::Running);

    let outcome = AssertUnwindSafe(runnable.run())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(WorkExecutionError::Panicked(panic_message(&*panic))));

    state.send_replace(match &outcome {
        Ok(_) => JobState::Completed,
        Err(e) => e.state(),
    });
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A live job owned by its named queue until reaped.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub label: Option<String>,
    pub submitted_at: DateTime<Utc>,
    state: watch::Receiver<JobState>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Start `work` through `executor` and wrap the task.
    pub fn start(
        executor: &dyn Executor,
        work: Work,
        completions: Arc<Notify>,
    ) -> Result<Self, JobCreationError> {
        let (label, runnable) = work.into_parts();
        let (state_tx, state_rx) = watch::channel(JobState::Pending);
        let task = executor.start(runnable, state_tx, completions)?;

        Ok(Self {
            id: JobId::new(),
            label,
            submitted_at: Utc::now(),
            state: state_rx,
            task,
        })
    }

    /// Current lifecycle state.
    ///
    /// A finished task that never reported a terminal state was aborted.
    pub fn state(&self) -> JobState {
        let reported = *self.state.borrow();
        if reported.is_terminal() || !self.task.is_finished() {
            reported
        } else {
            JobState::Stopped
        }
    }

    /// Whether the task has ended and its outcome can be taken without waiting.
    pub fn is_terminal(&self) -> bool {
        self.task.is_finished()
    }

    /// Request the task to stop at its next suspension point.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            label: self.label.clone(),
            state: self.state(),
            submitted_at: self.submitted_at,
        }
    }

    /// Take the outcome, consuming the handle and releasing its task.
    pub async fn into_outcome(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(WorkExecutionError::Stopped),
            Err(e) => Err(WorkExecutionError::Panicked(e.to_string())),
        }
    }
}
