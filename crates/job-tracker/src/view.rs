//! Read-only projection of tracker state handed to callers.

use job_types::StatusSnapshot;
use serde::Serialize;

/// Why tracking ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No status response ever arrived within the start-up window.
    StartupTimeout,
    /// The job stayed in `Processing` past the allowed number of polls.
    ProcessingTimeout,
    /// The backend reported `Failed`.
    ExplicitFailure,
    /// A poll failed with something other than not-found.
    Transport,
    /// The job went missing after it had been seen, under `MissingJobPolicy::Fail`.
    Disappeared,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerView {
    pub job_id: Option<String>,
    pub status_data: Option<StatusSnapshot>,
    pub error: Option<String>,
    pub is_complete: bool,
    /// `job_id` is set, not complete, no error.
    pub is_running: bool,
    /// A poll timer is scheduled.
    pub is_polling: bool,
    pub failure: Option<FailureKind>,
    /// Poll attempts counted toward the active timeout bound.
    pub attempts: u32,
    /// RFC 3339 time of the last applied poll result.
    pub updated_at: Option<String>,
}

impl TrackerView {
    /// Complete or failed: no further change will happen for this job.
    pub fn is_settled(&self) -> bool {
        self.is_complete || self.error.is_some()
    }

    /// Percent of the last snapshot, 0 when nothing was received yet.
    pub fn percent(&self) -> f64 {
        self.status_data
            .as_ref()
            .map(StatusSnapshot::clamped_percent)
            .unwrap_or(0.0)
    }

    pub fn message(&self) -> Option<&str> {
        self.status_data.as_ref().map(|s| s.message.as_str())
    }
}
