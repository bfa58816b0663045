//! Tracker configuration: poll cadence and timeout bounds.

use std::str::FromStr;
use std::time::Duration;

/// What a not-found response means once the job has been seen at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingJobPolicy {
    /// The backend cleaned up a finished job: treat as success.
    #[default]
    AssumeCompleted,
    /// The job vanished: treat as failure.
    Fail,
}

impl FromStr for MissingJobPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" => Ok(MissingJobPolicy::AssumeCompleted),
            "fail" | "failed" | "error" => Ok(MissingJobPolicy::Fail),
            other => Err(format!("unknown missing-job policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay between polls; the first poll is immediate.
    pub poll_interval: Duration,
    /// Polls without any status response before giving up on job start-up.
    pub startup_timeout_polls: u32,
    /// Polls in `Processing` (after the first response) before giving up.
    pub processing_timeout_polls: u32,
    pub missing_job_policy: MissingJobPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            startup_timeout_polls: 45,
            processing_timeout_polls: 300,
            missing_job_policy: MissingJobPolicy::AssumeCompleted,
        }
    }
}

impl TrackerConfig {
    /// Defaults overridden by `JOB_POLL_INTERVAL_MS`, `JOB_STARTUP_TIMEOUT_POLLS`,
    /// `JOB_PROCESSING_TIMEOUT_POLLS` and `JOB_MISSING_POLICY`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparsable setting");
                    None
                }
            }
        }

        let mut cfg = Self::default();
        let interval_ms: Option<u64> = parsed(&lookup, "JOB_POLL_INTERVAL_MS");
        if let Some(ms) = interval_ms.filter(|ms| *ms > 0) {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parsed(&lookup, "JOB_STARTUP_TIMEOUT_POLLS") {
            cfg.startup_timeout_polls = n;
        }
        if let Some(n) = parsed(&lookup, "JOB_PROCESSING_TIMEOUT_POLLS") {
            cfg.processing_timeout_polls = n;
        }
        if let Some(p) = parsed(&lookup, "JOB_MISSING_POLICY") {
            cfg.missing_job_policy = p;
        }
        cfg
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_startup_timeout_polls(mut self, polls: u32) -> Self {
        self.startup_timeout_polls = polls;
        self
    }

    pub fn with_processing_timeout_polls(mut self, polls: u32) -> Self {
        self.processing_timeout_polls = polls;
        self
    }

    pub fn with_missing_job_policy(mut self, policy: MissingJobPolicy) -> Self {
        self.missing_job_policy = policy;
        self
    }
}
