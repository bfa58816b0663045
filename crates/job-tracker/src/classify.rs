//! Classification of one poll result into the tracker state machine.

use crate::config::{MissingJobPolicy, TrackerConfig};
use crate::view::FailureKind;
use job_types::{JobApiError, JobStatus, StatusSnapshot};

pub(crate) const COMPLETED_MESSAGE: &str = "Import completed successfully!";
pub(crate) const STARTUP_TIMEOUT_MESSAGE: &str = "Import job initialization timed out.";
pub(crate) const PROCESSING_TIMEOUT_MESSAGE: &str =
    "Import is taking longer than expected. Please try again later.";
pub(crate) const DISAPPEARED_MESSAGE: &str = "Import job disappeared before completing.";
const FAILED_FALLBACK: &str = "Import failed";
const STATUS_FALLBACK: &str = "Failed to check import status";

/// Per-job poll bookkeeping. Never leaves the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PollState {
    pub in_flight: bool,
    /// Terminal latch.
    pub has_completed: bool,
    /// Counted at poll issue; reset on the first status response.
    pub attempts: u32,
    pub saw_first_success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    /// Not found during start-up; keep polling.
    Pending,
    /// Non-terminal snapshot.
    Progress(StatusSnapshot),
    /// Success; carries the received snapshot when there was one.
    Succeeded(Option<StatusSnapshot>),
    Failed {
        kind: FailureKind,
        message: String,
        snapshot: Option<StatusSnapshot>,
    },
}

impl Outcome {
    fn failed(kind: FailureKind, message: impl Into<String>, snapshot: Option<StatusSnapshot>) -> Self {
        Outcome::Failed {
            kind,
            message: message.into(),
            snapshot,
        }
    }
}

/// Classify the result of a poll whose attempt was already counted in `poll.attempts`.
pub(crate) fn classify(
    poll: &mut PollState,
    cfg: &TrackerConfig,
    result: Result<StatusSnapshot, JobApiError>,
) -> Outcome {
    match result {
        Err(JobApiError::NotFound) => {
            if poll.saw_first_success {
                match cfg.missing_job_policy {
                    MissingJobPolicy::AssumeCompleted => Outcome::Succeeded(None),
                    MissingJobPolicy::Fail => {
                        Outcome::failed(FailureKind::Disappeared, DISAPPEARED_MESSAGE, None)
                    }
                }
            } else if poll.attempts > cfg.startup_timeout_polls {
                Outcome::failed(FailureKind::StartupTimeout, STARTUP_TIMEOUT_MESSAGE, None)
            } else {
                Outcome::Pending
            }
        }
        Err(e) => {
            let message = e.server_message().unwrap_or(STATUS_FALLBACK).to_string();
            Outcome::failed(FailureKind::Transport, message, None)
        }
        Ok(snapshot) => {
            if !poll.saw_first_success {
                poll.saw_first_success = true;
                poll.attempts = 0;
            }
            if snapshot.status == Some(JobStatus::Succeeded) || snapshot.percent >= 100.0 {
                Outcome::Succeeded(Some(snapshot))
            } else if snapshot.status == Some(JobStatus::Failed) {
                let message = snapshot.failure_message().unwrap_or(FAILED_FALLBACK).to_string();
                Outcome::failed(FailureKind::ExplicitFailure, message, Some(snapshot))
            } else if poll.attempts > cfg.processing_timeout_polls {
                Outcome::failed(
                    FailureKind::ProcessingTimeout,
                    PROCESSING_TIMEOUT_MESSAGE,
                    Some(snapshot),
                )
            } else {
                Outcome::Progress(snapshot)
            }
        }
    }
}
