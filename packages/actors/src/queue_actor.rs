//! Queue actor owning the live jobs of a single named queue.
//!
//! Every mutation of a queue (admit, reap, cancel) is a message to its actor,
//! so a scan never races an admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use throttle_core::{ConcurrencyCap, JobState, QueueStats, ReapedJob, ThrottleEvent};
use tokio::sync::{Notify, broadcast};

use crate::error::JobCreationError;
use crate::executor::{Executor, JobHandle};
use crate::messages::{Admission, QueueMessage};
use crate::work::Work;

/// State readable without a round trip through the actor.
#[derive(Debug, Default)]
pub struct QueueShared {
    /// Woken whenever a job of this queue ends.
    pub completions: Arc<Notify>,
    occupancy: AtomicUsize,
}

impl QueueShared {
    /// Live (unreaped) jobs as of the actor's last mutation.
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::SeqCst)
    }
}

/// State for the queue actor.
pub struct QueueActorState {
    name: String,
    /// Live jobs in insertion order.
    jobs: Vec<JobHandle>,
    /// Reaped jobs not yet handed to a caller.
    outcomes: Vec<ReapedJob>,
    /// Cumulative counters; occupancy, pending and running are filled on read.
    stats: QueueStats,
    shared: Arc<QueueShared>,
    executor: Arc<dyn Executor>,
    event_tx: broadcast::Sender<ThrottleEvent>,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(
        name: impl Into<String>,
        shared: Arc<QueueShared>,
        executor: Arc<dyn Executor>,
        event_tx: broadcast::Sender<ThrottleEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            jobs: Vec::new(),
            outcomes: Vec::new(),
            stats: QueueStats::default(),
            shared,
            executor,
            event_tx,
        }
    }

    /// Broadcast an event.
    fn broadcast(&self, event: ThrottleEvent) {
        let _ = self.event_tx.send(event);
    }

    fn sync_occupancy(&self) {
        self.shared
            .occupancy
            .store(self.jobs.len(), Ordering::SeqCst);
    }

    /// Remove every terminal job, in insertion order, and record its outcome.
    async fn reap(&mut self) -> usize {
        if self.jobs.is_empty() {
            return 0;
        }

        let (finished, live): (Vec<JobHandle>, Vec<JobHandle>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(JobHandle::is_terminal);
        self.jobs = live;

        let reaped = finished.len();
        for handle in finished {
            let job_id = handle.id;
            let label = handle.label.clone();
            let submitted_at = handle.submitted_at;
            let outcome = handle.into_outcome().await;

            let job = ReapedJob {
                job_id,
                queue: self.name.clone(),
                label,
                outcome,
                submitted_at,
                reaped_at: Utc::now(),
            };
            let state = job.state();
            match state {
                JobState::Completed => self.stats.completed += 1,
                JobState::Stopped => self.stats.stopped += 1,
                _ => self.stats.failed += 1,
            }

            tracing::debug!(queue = %self.name, %job_id, %state, "Reaped job");
            self.broadcast(ThrottleEvent::JobReaped {
                job_id,
                queue: self.name.clone(),
                state,
                error: job.error().map(ToString::to_string),
                timestamp: job.reaped_at,
            });
            self.outcomes.push(job);
        }

        self.sync_occupancy();
        reaped
    }

    async fn admit(
        &mut self,
        work: Box<Work>,
        cap: ConcurrencyCap,
    ) -> Result<Admission, JobCreationError> {
        self.reap().await;

        let occupancy = self.jobs.len();
        if !cap.admits(occupancy) {
            return Ok(Admission::AtCapacity { occupancy, work });
        }

        let handle = JobHandle::start(&*self.executor, *work, self.shared.completions.clone())
            .inspect_err(|e| {
                tracing::warn!(queue = %self.name, "Failed to start job: {}", e);
            })?;
        let job_id = handle.id;

        tracing::debug!(queue = %self.name, %job_id, label = ?handle.label, "Started job");
        self.broadcast(ThrottleEvent::JobStarted {
            job_id,
            queue: self.name.clone(),
            label: handle.label.clone(),
            timestamp: handle.submitted_at,
        });

        self.jobs.push(handle);
        self.stats.submitted += 1;
        self.sync_occupancy();

        Ok(Admission::Admitted(job_id))
    }

    fn current_stats(&self) -> QueueStats {
        let mut stats = self.stats.clone();
        stats.occupancy = self.jobs.len() as u64;
        stats.pending = 0;
        stats.running = 0;
        for job in &self.jobs {
            match job.state() {
                JobState::Pending => stats.pending += 1,
                JobState::Running => stats.running += 1,
                _ => {}
            }
        }
        stats
    }
}

/// Queue actor that manages a single named queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", args.name);
        Ok(args)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if state.jobs.is_empty() {
            tracing::info!("Stopped queue actor: {}", state.name);
        } else {
            tracing::warn!(
                "Stopped queue actor {} with {} unreaped job(s); they keep running detached",
                state.name,
                state.jobs.len()
            );
        }
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Admit { work, cap, reply } => {
                let admission = state.admit(work, cap).await;
                let _ = reply.send(admission);
            }

            QueueMessage::Reap { reply } => {
                let reaped = state.reap().await;
                let _ = reply.send(reaped);
            }

            QueueMessage::TakeOutcomes { reply } => {
                let _ = reply.send(std::mem::take(&mut state.outcomes));
            }

            QueueMessage::Cancel { job_id, reply } => {
                match state.jobs.iter().find(|job| job.id == job_id) {
                    Some(job) => {
                        job.abort();
                        tracing::debug!(queue = %state.name, %job_id, "Cancelled job");
                        state.broadcast(ThrottleEvent::JobCancelled {
                            job_id,
                            queue: state.name.clone(),
                            timestamp: Utc::now(),
                        });
                        let _ = reply.send(true);
                    }
                    None => {
                        let _ = reply.send(false);
                    }
                }
            }

            QueueMessage::ListJobs { reply } => {
                let _ = reply.send(state.jobs.iter().map(JobHandle::snapshot).collect());
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.current_stats());
            }
        }

        Ok(())
    }
}
