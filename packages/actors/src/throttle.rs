//! Public entry point: submit, reap and drain work under named queues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ractor::{ActorRef, RpcReplyPort};
use throttle_core::{
    ConcurrencyCap, DrainReport, JobId, JobSnapshot, QueueStats, ReapedJob, ThrottleEvent,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ThrottleConfig;
use crate::error::{ThrottleError, ThrottleResult};
use crate::executor::{Executor, TokioExecutor};
use crate::messages::{Admission, QueueMessage};
use crate::registry::{QueueEntry, QueueLease, QueueRegistry};
use crate::work::Work;

/// Options for [`JobThrottle::submit_all`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Cap for this invocation; the configured default when unset.
    pub cap: Option<ConcurrencyCap>,
    /// Block until the queue drains once every unit is admitted.
    pub wait_for_drain: bool,
    /// Give up on admitting a unit after this long.
    pub admission_deadline: Option<Duration>,
    /// Drain settings used when `wait_for_drain` is set.
    pub drain: DrainOptions,
}

impl SubmitOptions {
    pub fn with_cap(mut self, cap: ConcurrencyCap) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn wait_for_drain(mut self) -> Self {
        self.wait_for_drain = true;
        self
    }

    pub fn with_admission_deadline(mut self, deadline: Duration) -> Self {
        self.admission_deadline = Some(deadline);
        self
    }
}

/// Options for [`JobThrottle::await_drain_with`].
#[derive(Debug, Clone, Default)]
pub struct DrainOptions {
    /// Progress report period; the configured default when unset.
    pub report_interval: Option<Duration>,
    /// Fail with `DrainTimedOut` after this long.
    pub deadline: Option<Duration>,
}

impl DrainOptions {
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of [`JobThrottle::submit_all`].
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Admitted jobs in submission order.
    pub job_ids: Vec<JobId>,
    /// Present when the call waited for the queue to drain.
    pub drain: Option<DrainReport>,
}

/// Bounded-concurrency job submission over named queues.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct JobThrottle {
    registry: Arc<QueueRegistry>,
    config: ThrottleConfig,
    event_tx: broadcast::Sender<ThrottleEvent>,
}

impl JobThrottle {
    /// Create a throttle running work on the current tokio runtime.
    pub fn new(config: ThrottleConfig) -> ThrottleResult<Self> {
        let mut executor = TokioExecutor::new();
        if let Some(limit) = config.max_live_jobs {
            executor = executor.with_max_live_jobs(limit);
        }
        Self::with_executor(config, Arc::new(executor))
    }

    /// Create a throttle with a custom execution substrate.
    pub fn with_executor(config: ThrottleConfig, executor: Arc<dyn Executor>) -> ThrottleResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            registry: Arc::new(QueueRegistry::new(executor, event_tx.clone())),
            config,
            event_tx,
        })
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Subscribe to throttle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ThrottleEvent> {
        self.event_tx.subscribe()
    }

    /// Admit one unit of work under `queue`, waiting while the queue is at `cap`.
    pub async fn submit(&self, queue: &str, work: Work, cap: ConcurrencyCap) -> ThrottleResult<JobId> {
        let lease = self.registry.acquire(queue).await?;
        self.admit(&lease, work, cap, None).await
    }

    /// Admit every unit in order, then optionally wait for the queue to drain.
    pub async fn submit_all(
        &self,
        queue: &str,
        works: impl IntoIterator<Item = Work>,
        options: SubmitOptions,
    ) -> ThrottleResult<Submission> {
        let cap = options.cap.unwrap_or(self.config.default_cap);
        let lease = self.registry.acquire(queue).await?;

        let mut job_ids = Vec::new();
        for work in works {
            job_ids.push(self.admit(&lease, work, cap, options.admission_deadline).await?);
        }

        let drain = if options.wait_for_drain {
            Some(self.drain(lease, &options.drain).await?)
        } else {
            None
        };
        Ok(Submission { job_ids, drain })
    }

    async fn admit(
        &self,
        lease: &QueueLease,
        work: Work,
        cap: ConcurrencyCap,
        deadline: Option<Duration>,
    ) -> ThrottleResult<JobId> {
        let entry = lease.entry();
        let started = Instant::now();
        let mut work = Box::new(work);

        loop {
            let admission = ask(entry.actor(), |reply| QueueMessage::Admit { work, cap, reply })
                .await??;

            let occupancy = match admission {
                Admission::Admitted(job_id) => return Ok(job_id),
                Admission::AtCapacity {
                    occupancy,
                    work: returned,
                } => {
                    work = returned;
                    occupancy
                }
            };

            tracing::warn!(
                queue = entry.name(),
                occupancy,
                %cap,
                "Queue at capacity, backing off"
            );
            let _ = self.event_tx.send(ThrottleEvent::CapacityExceeded {
                queue: entry.name().to_string(),
                occupancy,
                cap,
                timestamp: Utc::now(),
            });

            let mut wait = self.config.backoff_interval;
            if let Some(deadline) = deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    return Err(ThrottleError::AdmissionTimedOut {
                        queue: entry.name().to_string(),
                        occupancy,
                        waited,
                    });
                }
                wait = wait.min(deadline - waited);
            }
            self.wait_for_completion(lease, wait).await;
        }
    }

    /// Reap terminal jobs of `queue`. A no-op on an absent queue.
    pub async fn reap(&self, queue: &str) -> ThrottleResult<usize> {
        let Some(entry) = self.registry.get(queue).await else {
            return Ok(0);
        };
        match ask(entry.actor(), |reply| QueueMessage::Reap { reply }).await {
            Ok(reaped) => Ok(reaped),
            // Removed by a drain after the lookup; it was empty then.
            Err(_) if !self.registry.is_registered(&entry).await => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Hand out outcomes reaped so far without waiting for a drain.
    ///
    /// A queue keeps every reaped outcome until it is taken here or by a
    /// drain. Long-lived queues that are only ever submitted to must call
    /// this periodically, or their outcomes accumulate for the life of the
    /// process.
    pub async fn take_outcomes(&self, queue: &str) -> ThrottleResult<Vec<ReapedJob>> {
        let Some(lease) = self.registry.attach(queue).await else {
            return Ok(Vec::new());
        };
        ask(lease.entry().actor(), |reply| QueueMessage::TakeOutcomes { reply }).await
    }

    /// Block until `queue` is empty, using the configured report interval.
    pub async fn await_drain(&self, queue: &str) -> ThrottleResult<DrainReport> {
        self.await_drain_with(queue, DrainOptions::default()).await
    }

    /// Block until `queue` is empty.
    ///
    /// Returns every outcome not yet handed out and removes the queue from
    /// the registry. While another caller is still submitting to the queue
    /// the drain keeps waiting, even if the queue is momentarily empty.
    pub async fn await_drain_with(
        &self,
        queue: &str,
        options: DrainOptions,
    ) -> ThrottleResult<DrainReport> {
        match self.registry.attach(queue).await {
            Some(lease) => self.drain(lease, &options).await,
            None => Ok(DrainReport::empty(queue)),
        }
    }

    async fn drain(
        &self,
        mut lease: QueueLease,
        options: &DrainOptions,
    ) -> ThrottleResult<DrainReport> {
        lease.start_draining();
        let entry = lease.entry();
        let report_interval = options.report_interval.unwrap_or(self.config.report_interval);
        let started = Instant::now();
        let mut last_report = started;
        let mut outcomes = Vec::new();

        loop {
            if let Err(e) = ask(entry.actor(), |reply| QueueMessage::Reap { reply }).await {
                return self.drained_elsewhere(entry, e, outcomes, started).await;
            }

            let occupancy = entry.occupancy();
            if occupancy == 0 {
                match ask(entry.actor(), |reply| QueueMessage::TakeOutcomes { reply }).await {
                    Ok(taken) => outcomes.extend(taken),
                    Err(e) => return self.drained_elsewhere(entry, e, outcomes, started).await,
                }
                if self.registry.remove_if_drained(&lease).await {
                    // A reap racing the removal may have parked outcomes after the take above.
                    let remaining =
                        ask(entry.actor(), |reply| QueueMessage::TakeOutcomes { reply }).await;
                    entry.actor().stop(None);
                    outcomes.extend(remaining?);
                    return Ok(self.finish_drain(entry.name(), outcomes, started, true));
                }
                if !self.registry.is_registered(entry).await {
                    return Ok(self.finish_drain(entry.name(), outcomes, started, false));
                }
                // Empty, but a submitter still holds the queue.
            }

            if let Some(deadline) = options.deadline
                && started.elapsed() >= deadline
            {
                return Err(ThrottleError::DrainTimedOut {
                    queue: entry.name().to_string(),
                    occupancy,
                    waited: started.elapsed(),
                });
            }

            if last_report.elapsed() >= report_interval {
                tracing::warn!(queue = entry.name(), occupancy, "Queue still draining");
                let _ = self.event_tx.send(ThrottleEvent::QueueDraining {
                    queue: entry.name().to_string(),
                    occupancy,
                    timestamp: Utc::now(),
                });
                last_report = Instant::now();
            }

            self.wait_for_completion(&lease, self.config.poll_interval)
                .await;
        }
    }

    /// A queue actor went away mid-drain. Fine if another drain removed it.
    async fn drained_elsewhere(
        &self,
        entry: &QueueEntry,
        error: ThrottleError,
        outcomes: Vec<ReapedJob>,
        started: Instant,
    ) -> ThrottleResult<DrainReport> {
        if self.registry.is_registered(entry).await {
            return Err(error);
        }
        Ok(self.finish_drain(entry.name(), outcomes, started, false))
    }

    fn finish_drain(
        &self,
        queue: &str,
        outcomes: Vec<ReapedJob>,
        started: Instant,
        removed: bool,
    ) -> DrainReport {
        let reaped = outcomes.len();
        tracing::info!(queue, reaped, removed, "Queue drained");
        let _ = self.event_tx.send(ThrottleEvent::QueueDrained {
            queue: queue.to_string(),
            reaped,
            timestamp: Utc::now(),
        });
        DrainReport {
            queue: queue.to_string(),
            outcomes,
            elapsed: started.elapsed(),
            removed,
        }
    }

    /// Sleep for at most `limit`, waking early when a job of the queue ends.
    async fn wait_for_completion(&self, lease: &QueueLease, limit: Duration) {
        let completions = lease.entry().shared().completions.clone();
        let notified = completions.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(limit) => {}
        }
    }

    /// Abort one live job. It is reaped as Stopped.
    pub async fn cancel(&self, queue: &str, job_id: JobId) -> ThrottleResult<bool> {
        let Some(lease) = self.registry.attach(queue).await else {
            return Ok(false);
        };
        ask(lease.entry().actor(), |reply| QueueMessage::Cancel { job_id, reply }).await
    }

    /// Statistics of `queue`, if registered.
    pub async fn stats(&self, queue: &str) -> ThrottleResult<Option<QueueStats>> {
        let Some(lease) = self.registry.attach(queue).await else {
            return Ok(None);
        };
        ask(lease.entry().actor(), |reply| QueueMessage::GetStats { reply })
            .await
            .map(Some)
    }

    /// Live jobs of `queue` in insertion order.
    pub async fn jobs(&self, queue: &str) -> ThrottleResult<Vec<JobSnapshot>> {
        let Some(lease) = self.registry.attach(queue).await else {
            return Ok(Vec::new());
        };
        ask(lease.entry().actor(), |reply| QueueMessage::ListJobs { reply }).await
    }

    /// Names of all registered queues, sorted.
    pub async fn queue_names(&self) -> Vec<String> {
        self.registry.names().await
    }

    pub async fn contains_queue(&self, queue: &str) -> bool {
        self.registry.contains(queue).await
    }

    /// Stop every queue actor. Unreaped jobs keep running but are forgotten.
    pub async fn shutdown(&self) {
        let stopped = self.registry.clear().await;
        tracing::info!("Job throttle shut down ({} queue(s) stopped)", stopped);
    }
}

impl std::fmt::Debug for JobThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobThrottle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Send a request to a queue actor and wait for the reply.
async fn ask<T>(
    actor: &ActorRef<QueueMessage>,
    build: impl FnOnce(RpcReplyPort<T>) -> QueueMessage,
) -> ThrottleResult<T>
where
    T: Send + 'static,
{
    let (tx, rx) = ractor::concurrency::oneshot();
    actor
        .send_message(build(tx.into()))
        .map_err(|e| ThrottleError::Actor(format!("Queue actor unreachable: {}", e)))?;
    rx.await
        .map_err(|_| ThrottleError::Actor("Queue actor dropped the reply".into()))
}
