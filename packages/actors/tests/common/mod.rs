#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{JobThrottle, ThrottleConfig, ThrottleError, Work};
use throttle_core::JobResult;
use tokio::sync::watch;

/// Short intervals so tests spend little time sleeping.
pub fn fast_config() -> ThrottleConfig {
    ThrottleConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_backoff_interval(Duration::from_millis(10))
        .with_report_interval(Duration::from_millis(50))
}

pub fn throttle() -> Result<JobThrottle, ThrottleError> {
    JobThrottle::new(fast_config())
}

/// Work that returns immediately.
pub fn instant(summary: &str) -> Work {
    let summary = summary.to_string();
    Work::new(move || async move { Ok(JobResult::new(summary)) })
}

/// Work that fails immediately.
pub fn failing(error: &str) -> Work {
    let error = error.to_string();
    Work::new(move || async move { Err(error) })
}

/// Holds jobs until opened.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn work(&self, summary: &str) -> Work {
        let mut rx = self.tx.subscribe();
        let summary = summary.to_string();
        Work::new(move || async move {
            let opened = rx.wait_for(|open| *open).await.is_ok();
            if !opened {
                return Err("gate dropped".to_string());
            }
            Ok(JobResult::new(summary))
        })
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

/// Tracks how many probe jobs run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work(&self, hold: Duration) -> Work {
        let probe = self.clone();
        Work::new(move || async move {
            let now = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
            probe.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            probe.current.fetch_sub(1, Ordering::SeqCst);
            Ok(JobResult::new("probed"))
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
