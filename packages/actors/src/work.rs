//! Units of work and their optional initializers.

use std::future::Future;
use std::pin::Pin;

use throttle_core::{JobOutcome, JobResult, WorkExecutionError};

/// Result type returned by a unit of work.
pub type WorkResult = Result<JobResult, String>;

/// Future type for async work bodies.
pub type WorkFuture = Pin<Box<dyn Future<Output = WorkResult> + Send>>;

/// Future type for initializers.
pub type InitFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

type BodyFn = Box<dyn FnOnce() -> WorkFuture + Send>;
type InitFn = Box<dyn FnOnce() -> InitFuture + Send>;

/// A zero-argument callable submitted to a named queue.
///
/// The optional initializer runs once, in the same task, before the body.
/// If it fails the body is never called.
pub struct Work {
    label: Option<String>,
    body: BodyFn,
    init: Option<InitFn>,
}

impl Work {
    /// Create work from an async closure.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        Self {
            label: None,
            body: Box::new(move || Box::pin(body())),
            init: None,
        }
    }

    /// Create work from a synchronous closure, run on the blocking pool.
    pub fn blocking<F>(body: F) -> Self
    where
        F: FnOnce() -> WorkResult + Send + 'static,
    {
        Self::new(move || async move {
            tokio::task::spawn_blocking(body)
                .await
                .map_err(|e| format!("blocking work did not finish: {}", e))?
        })
    }

    /// Run `init` before the body.
    pub fn with_init<F, Fut>(mut self, init: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.init = Some(Box::new(move || Box::pin(init())));
        self
    }

    /// Attach a label shown in logs, events and snapshots.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn has_init(&self) -> bool {
        self.init.is_some()
    }

    /// Split off the label and the runnable part.
    pub(crate) fn into_parts(self) -> (Option<String>, Runnable) {
        (
            self.label,
            Runnable {
                body: self.body,
                init: self.init,
            },
        )
    }
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("label", &self.label)
            .field("has_init", &self.init.is_some())
            .finish_non_exhaustive()
    }
}

/// The callable half of [`Work`], handed to an executor.
pub struct Runnable {
    body: BodyFn,
    init: Option<InitFn>,
}

impl Runnable {
    /// Run the initializer, then the body.
    pub async fn run(self) -> JobOutcome {
        if let Some(init) = self.init {
            init().await.map_err(WorkExecutionError::InitFailed)?;
        }
        (self.body)().await.map_err(WorkExecutionError::Failed)
    }
}

impl std::fmt::Debug for Runnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runnable")
            .field("has_init", &self.init.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn init_runs_before_body() {
        let ready = Arc::new(AtomicBool::new(false));
        let init_flag = ready.clone();
        let work = Work::new(move || async move {
            if ready.load(Ordering::SeqCst) {
                Ok(JobResult::new("initialized"))
            } else {
                Err("body ran first".to_string())
            }
        })
        .with_init(move || async move {
            init_flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let (_, runnable) = work.into_parts();
        assert_eq!(runnable.run().await, Ok(JobResult::new("initialized")));
    }

    #[tokio::test]
    async fn failing_init_skips_body() {
        let body_ran = Arc::new(AtomicBool::new(false));
        let flag = body_ran.clone();
        let work = Work::new(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(JobResult::new("unreachable"))
        })
        .with_init(|| async { Err("missing credentials".to_string()) });

        let (_, runnable) = work.into_parts();
        assert_eq!(
            runnable.run().await,
            Err(WorkExecutionError::InitFailed("missing credentials".into()))
        );
        assert!(!body_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn blocking_work_returns_its_result() {
        let work = Work::blocking(|| Err("disk full".to_string())).with_label("sync");
        assert_eq!(work.label(), Some("sync"));
        let (_, runnable) = work.into_parts();
        assert_eq!(
            runnable.run().await,
            Err(WorkExecutionError::Failed("disk full".into()))
        );
    }
}
