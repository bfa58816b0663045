//! Request and response DTOs for the job status API.

use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the job status endpoint.
///
/// The known states also accept all-lowercase and all-uppercase spellings. Any other value,
/// such as `"Queued"`, reads as `Other` and is treated as still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(alias = "processing", alias = "PROCESSING")]
    Processing,
    #[serde(alias = "succeeded", alias = "SUCCEEDED")]
    Succeeded,
    #[serde(alias = "failed", alias = "FAILED")]
    Failed,
    #[serde(other)]
    Other,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "Processing",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
            JobStatus::Other => "Other",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a successful `GET /status/{jobId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn new(status: JobStatus, percent: f64, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            percent,
            message: message.into(),
            error: None,
        }
    }

    /// Terminal success snapshot: 100 percent, `Succeeded`.
    pub fn completed(message: impl Into<String>) -> Self {
        Self::new(JobStatus::Succeeded, 100.0, message)
    }

    /// Percent clamped to 0..=100; NaN reads as 0.
    pub fn clamped_percent(&self) -> f64 {
        if self.percent.is_nan() {
            0.0
        } else {
            self.percent.clamp(0.0, 100.0)
        }
    }

    /// Failure text carried by the payload: `error`, else a non-empty `message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| Some(self.message.as_str()).filter(|m| !m.trim().is_empty()))
    }
}

/// Body of a successful job start (`POST /import`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartJobResponse {
    #[serde(rename = "jobId", alias = "job_id")]
    pub job_id: String,
}

/// Error envelope some backends return alongside non-2xx status codes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|m| !m.trim().is_empty())
            .or(self.error.filter(|e| !e.trim().is_empty()))
    }
}
