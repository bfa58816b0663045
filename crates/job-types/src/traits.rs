//! Trait for the remote job API and its error type.

use crate::StatusSnapshot;
use async_trait::async_trait;

/// Remote job API: start a job, query its status.
///
/// Contract: `job_status` returns `Err(JobApiError::NotFound)` when the job id is unknown to the
/// backend, either because it has not been created yet or because its status record was
/// already cleaned up. Callers decide which of the two it is.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Start a job from the given request body; returns its job id.
    async fn submit_job(&self, body: &serde_json::Value) -> Result<String, JobApiError>;

    /// Fetch the current status of a job.
    async fn job_status(&self, job_id: &str) -> Result<StatusSnapshot, JobApiError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobApiError {
    #[error("job not found")]
    NotFound,
    #[error("job API error {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Http {
        status: u16,
        message: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl JobApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JobApiError::NotFound)
    }

    /// Message suitable for showing to a user, when the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            JobApiError::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display() {
        let e = JobApiError::Http {
            status: 503,
            message: Some("maintenance".into()),
        };
        assert_eq!(e.to_string(), "job API error 503: maintenance");
        assert_eq!(e.server_message(), Some("maintenance"));
        let e = JobApiError::Http {
            status: 500,
            message: None,
        };
        assert_eq!(e.to_string(), "job API error 500: no details");
        assert!(!e.is_not_found());
        assert!(JobApiError::NotFound.is_not_found());
    }
}
