//! Bounded-concurrency job throttle built on actors.
//!
//! Callers submit units of work under named queues. Each queue caps how many
//! jobs it holds at once, reaps finished jobs as capacity frees up, and can be
//! drained until empty.
//!
//! # Architecture
//!
//! - `JobThrottle` - Entry point owning the queue registry
//! - `QueueActor` - Single writer for one named queue's live jobs
//! - `Executor` - Execution substrate that runs work (tokio tasks by default)
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobThrottle, SubmitOptions, ThrottleConfig, Work};
//! use throttle_core::{ConcurrencyCap, JobResult};
//!
//! let throttle = JobThrottle::new(ThrottleConfig::default())?;
//! let works = (0..5).map(|i| Work::new(move || async move {
//!     Ok(JobResult::new(format!("job {i} done")))
//! }));
//! let submission = throttle
//!     .submit_all("A", works, SubmitOptions::default().with_cap(ConcurrencyCap::bounded(2)).wait_for_drain())
//!     .await?;
//! ```

mod config;
mod error;
mod executor;
mod messages;
mod queue_actor;
pub mod registry;
mod throttle;
mod work;

pub use config::ThrottleConfig;
pub use error::{JobCreationError, ThrottleError, ThrottleResult};
pub use executor::{Executor, JobHandle, TokioExecutor};
pub use messages::{Admission, QueueMessage};
pub use queue_actor::{QueueActor, QueueActorState, QueueShared};
pub use registry::{QueueEntry, QueueLease, QueueRegistry};
pub use throttle::{DrainOptions, JobThrottle, SubmitOptions, Submission};
pub use work::{InitFuture, Runnable, Work, WorkFuture, WorkResult};

/// Re-export ractor types for convenience.
pub use ractor::{ActorRef, RpcReplyPort};
