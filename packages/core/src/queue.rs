//! Named queue types: concurrency caps, statistics and drain reports.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ReapedJob;

/// Default cap applied when a caller does not pick one.
pub const DEFAULT_CONCURRENCY_CAP: usize = 10;

/// Maximum number of live jobs a named queue may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyCap {
    /// At most this many unreaped jobs.
    Bounded(NonZeroUsize),
    /// No throttling, always admit.
    Unbounded,
}

impl ConcurrencyCap {
    /// Build a bounded cap. Zero means unbounded.
    pub fn bounded(limit: usize) -> Self {
        NonZeroUsize::new(limit).map_or(Self::Unbounded, Self::Bounded)
    }

    /// Check whether a queue currently holding `occupancy` jobs may start one more.
    pub fn admits(&self, occupancy: usize) -> bool {
        match self {
            ConcurrencyCap::Bounded(limit) => occupancy < limit.get(),
            ConcurrencyCap::Unbounded => true,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            ConcurrencyCap::Bounded(limit) => Some(limit.get()),
            ConcurrencyCap::Unbounded => None,
        }
    }
}

impl Default for ConcurrencyCap {
    fn default() -> Self {
        Self::bounded(DEFAULT_CONCURRENCY_CAP)
    }
}

impl std::fmt::Display for ConcurrencyCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyCap::Bounded(limit) => write!(f, "{}", limit),
            ConcurrencyCap::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Error returned when a cap cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid concurrency cap '{0}' (expected a positive integer or 'unbounded')")]
pub struct ParseCapError(pub String);

impl FromStr for ConcurrencyCap {
    type Err = ParseCapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "unbounded" | "none" => Ok(Self::Unbounded),
            other => other
                .parse::<usize>()
                .map(Self::bounded)
                .map_err(|_| ParseCapError(trimmed.to_string())),
        }
    }
}

/// Statistics for a named queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Jobs submitted but not yet reaped.
    pub occupancy: u64,
    /// Live jobs whose task has not started yet.
    pub pending: u64,
    /// Live jobs currently executing.
    pub running: u64,
    /// Jobs admitted since the queue was created.
    pub submitted: u64,
    /// Reaped jobs that completed.
    pub completed: u64,
    /// Reaped jobs that failed.
    pub failed: u64,
    /// Reaped jobs that were stopped.
    pub stopped: u64,
}

impl QueueStats {
    /// Total reaped jobs.
    pub fn reaped(&self) -> u64 {
        self.completed + self.failed + self.stopped
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.reaped();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// Everything a drain collected before the queue emptied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
    pub queue: String,
    /// Reaped jobs not previously handed out, in reap order.
    pub outcomes: Vec<ReapedJob>,
    pub elapsed: Duration,
    /// Whether this drain deleted the registry entry.
    pub removed: bool,
}

impl DrainReport {
    pub fn empty(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|j| j.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReapedJob> {
        self.outcomes.iter().filter(|j| !j.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_cap_admits_below_limit_only() {
        let cap = ConcurrencyCap::bounded(2);
        assert!(cap.admits(0));
        assert!(cap.admits(1));
        assert!(!cap.admits(2));
        assert!(!cap.admits(3));
        assert_eq!(cap.limit(), Some(2));
    }

    #[test]
    fn unbounded_cap_always_admits() {
        assert!(ConcurrencyCap::Unbounded.admits(usize::MAX));
        assert_eq!(ConcurrencyCap::bounded(0), ConcurrencyCap::Unbounded);
    }

    #[test]
    fn default_cap_is_ten() {
        assert_eq!(ConcurrencyCap::default().limit(), Some(DEFAULT_CONCURRENCY_CAP));
    }

    #[test]
    fn parse_caps() -> Result<(), ParseCapError> {
        assert_eq!("4".parse::<ConcurrencyCap>()?, ConcurrencyCap::bounded(4));
        assert_eq!(" Unbounded ".parse::<ConcurrencyCap>()?, ConcurrencyCap::Unbounded);
        assert_eq!("none".parse::<ConcurrencyCap>()?, ConcurrencyCap::Unbounded);
        assert_eq!("0".parse::<ConcurrencyCap>()?, ConcurrencyCap::Unbounded);
        assert!("unlimited".parse::<ConcurrencyCap>().is_err());
        assert!("-1".parse::<ConcurrencyCap>().is_err());
        assert!("many".parse::<ConcurrencyCap>().is_err());
        Ok(())
    }

    #[test]
    fn success_rate() {
        let stats = QueueStats {
            completed: 3,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(stats.reaped(), 4);
        assert_eq!(stats.success_rate(), Some(75.0));
        assert_eq!(QueueStats::default().success_rate(), None);
    }
}
