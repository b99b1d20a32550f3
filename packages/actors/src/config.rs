//! Throttle configuration with environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use throttle_core::ConcurrencyCap;

use crate::error::ThrottleError;

/// Tunables for admission, reaping and draining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Cap used by `submit_all` when options leave it unset.
    pub default_cap: ConcurrencyCap,
    /// Drain loop sleep between reaps.
    pub poll_interval: Duration,
    /// Admission wait after the queue is found at capacity.
    pub backoff_interval: Duration,
    /// How often a drain reports the remaining depth.
    pub report_interval: Duration,
    /// Process-wide cap on live jobs across every queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_live_jobs: Option<usize>,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_cap: ConcurrencyCap::default(),
            poll_interval: Duration::from_millis(250),
            backoff_interval: Duration::from_millis(1000),
            report_interval: Duration::from_secs(10),
            max_live_jobs: None,
            event_capacity: 1024,
        }
    }
}

impl ThrottleConfig {
    /// Read overrides from `THROTTLE_*` environment variables.
    pub fn from_env() -> Result<Self, ThrottleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ThrottleError> {
        let var = |key: &str| lookup(key).and_then(non_empty);
        let mut config = Self::default();

        if let Some(cap) = var("THROTTLE_DEFAULT_CAP") {
            config.default_cap = cap
                .parse()
                .map_err(|e| ThrottleError::InvalidConfig(format!("THROTTLE_DEFAULT_CAP: {e}")))?;
        }
        if let Some(ms) = parse_u64("THROTTLE_POLL_INTERVAL_MS", var("THROTTLE_POLL_INTERVAL_MS"))? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64("THROTTLE_BACKOFF_MS", var("THROTTLE_BACKOFF_MS"))? {
            config.backoff_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(
            "THROTTLE_REPORT_INTERVAL_SECS",
            var("THROTTLE_REPORT_INTERVAL_SECS"),
        )? {
            config.report_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_u64("THROTTLE_MAX_LIVE_JOBS", var("THROTTLE_MAX_LIVE_JOBS"))? {
            config.max_live_jobs = Some(to_usize("THROTTLE_MAX_LIVE_JOBS", limit)?);
        }
        if let Some(capacity) = parse_u64("THROTTLE_EVENT_CAPACITY", var("THROTTLE_EVENT_CAPACITY"))? {
            config.event_capacity = to_usize("THROTTLE_EVENT_CAPACITY", capacity)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals and limits, which would spin or deadlock.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        for (name, interval) in [
            ("poll_interval", self.poll_interval),
            ("backoff_interval", self.backoff_interval),
            ("report_interval", self.report_interval),
        ] {
            if interval.is_zero() {
                return Err(ThrottleError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.max_live_jobs == Some(0) {
            return Err(ThrottleError::InvalidConfig(
                "max_live_jobs must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ThrottleError::InvalidConfig(
                "event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn with_default_cap(mut self, cap: ConcurrencyCap) -> Self {
        self.default_cap = cap;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = interval;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_max_live_jobs(mut self, limit: usize) -> Self {
        self.max_live_jobs = Some(limit);
        self
    }
}

fn non_empty(v: String) -> Option<String> {
    let trimmed = v.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_u64(var_name: &str, value: Option<String>) -> Result<Option<u64>, ThrottleError> {
    let Some(v) = value else {
        return Ok(None);
    };
    v.parse::<u64>().map(Some).map_err(|_| {
        ThrottleError::InvalidConfig(format!(
            "invalid number for {var_name}={v} (expected a non-negative integer)"
        ))
    })
}

fn to_usize(var_name: &str, value: u64) -> Result<usize, ThrottleError> {
    usize::try_from(value)
        .map_err(|_| ThrottleError::InvalidConfig(format!("{var_name}={value} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_intervals() -> Result<(), ThrottleError> {
        let config = ThrottleConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config, ThrottleConfig::default());
        assert_eq!(config.default_cap, ConcurrencyCap::bounded(10));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.backoff_interval, Duration::from_millis(1000));
        assert_eq!(config.report_interval, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn overrides_are_applied() -> Result<(), ThrottleError> {
        let config = ThrottleConfig::from_lookup(lookup(&[
            ("THROTTLE_DEFAULT_CAP", "unbounded"),
            ("THROTTLE_POLL_INTERVAL_MS", "20"),
            ("THROTTLE_BACKOFF_MS", " 50 "),
            ("THROTTLE_REPORT_INTERVAL_SECS", "1"),
            ("THROTTLE_MAX_LIVE_JOBS", "64"),
            ("THROTTLE_EVENT_CAPACITY", ""),
        ]))?;
        assert_eq!(config.default_cap, ConcurrencyCap::Unbounded);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.backoff_interval, Duration::from_millis(50));
        assert_eq!(config.report_interval, Duration::from_secs(1));
        assert_eq!(config.max_live_jobs, Some(64));
        assert_eq!(config.event_capacity, 1024);
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        let zero = ThrottleConfig::from_lookup(lookup(&[("THROTTLE_POLL_INTERVAL_MS", "0")]));
        assert!(matches!(zero, Err(ThrottleError::InvalidConfig(_))));

        let garbage = ThrottleConfig::from_lookup(lookup(&[("THROTTLE_BACKOFF_MS", "soon")]));
        assert!(matches!(garbage, Err(ThrottleError::InvalidConfig(_))));

        let cap = ThrottleConfig::from_lookup(lookup(&[("THROTTLE_DEFAULT_CAP", "lots")]));
        assert!(matches!(cap, Err(ThrottleError::InvalidConfig(_))));
    }
}
