//! Mock job API for tests: scripted replies per job, no network.

use job_types::{JobApi, JobApiError, JobStatus, StatusSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

/// One scripted reply to `job_status`.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Status(StatusSnapshot),
    NotFound,
    Http(u16, Option<String>),
    Transport(String),
}

impl MockReply {
    pub fn processing(percent: f64, message: &str) -> Self {
        MockReply::Status(StatusSnapshot::new(JobStatus::Processing, percent, message))
    }

    pub fn succeeded(percent: f64, message: &str) -> Self {
        MockReply::Status(StatusSnapshot::new(JobStatus::Succeeded, percent, message))
    }

    pub fn failed(message: &str) -> Self {
        MockReply::Status(StatusSnapshot::new(JobStatus::Failed, 0.0, message))
    }

    fn into_result(self) -> Result<StatusSnapshot, JobApiError> {
        match self {
            MockReply::Status(s) => Ok(s),
            MockReply::NotFound => Err(JobApiError::NotFound),
            MockReply::Http(status, message) => Err(JobApiError::Http { status, message }),
            MockReply::Transport(e) => Err(JobApiError::Transport(e)),
        }
    }
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<MockReply>>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: Vec<String>,
    submitted: Vec<serde_json::Value>,
    in_flight: usize,
    max_in_flight: usize,
    next_job: u64,
}

/// Scripted `JobApi`.
///
/// Replies are consumed in order per job id; the last reply of a script repeats forever.
/// A job with no script answers `NotFound`. `hold` parks status requests for a job until
/// `release` is called, which lets tests keep a request in flight.
#[derive(Default)]
pub struct MockJobApi {
    state: Mutex<MockState>,
}

impl MockJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one reply to the script of `job_id`.
    pub fn push(&self, job_id: &str, reply: MockReply) -> &Self {
        self.lock()
            .scripts
            .entry(job_id.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Append `n` copies of `reply`.
    pub fn push_n(&self, job_id: &str, reply: MockReply, n: usize) -> &Self {
        let mut st = self.lock();
        let script = st.scripts.entry(job_id.to_string()).or_default();
        script.extend(std::iter::repeat(reply).take(n));
        drop(st);
        self
    }

    /// Drop the remaining script of `job_id`; it answers `NotFound` until new replies are pushed.
    pub fn clear(&self, job_id: &str) {
        self.lock().scripts.remove(job_id);
    }

    /// Park status requests for `job_id` until `release`.
    pub fn hold(&self, job_id: &str) {
        self.lock()
            .gates
            .insert(job_id.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let parked and future requests for `job_id` through.
    pub fn release(&self, job_id: &str) {
        if let Some(gate) = self.lock().gates.remove(job_id) {
            gate.close();
        }
    }

    /// Job ids of every status request so far, in issue order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, job_id: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == job_id).count()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Highest number of concurrently outstanding status requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    pub fn submitted(&self) -> Vec<serde_json::Value> {
        self.lock().submitted.clone()
    }

    fn next_reply(&self, job_id: &str) -> MockReply {
        let mut st = self.lock();
        let Some(script) = st.scripts.get_mut(job_id) else {
            return MockReply::NotFound;
        };
        if script.len() > 1 {
            script.pop_front().unwrap_or(MockReply::NotFound)
        } else {
            script.front().cloned().unwrap_or(MockReply::NotFound)
        }
    }
}

#[async_trait::async_trait]
impl JobApi for MockJobApi {
    async fn submit_job(&self, body: &serde_json::Value) -> Result<String, JobApiError> {
        let mut st = self.lock();
        st.submitted.push(body.clone());
        st.next_job += 1;
        Ok(format!("mock-job-{}", st.next_job))
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusSnapshot, JobApiError> {
        let gate = {
            let mut st = self.lock();
            st.calls.push(job_id.to_string());
            st.in_flight += 1;
            st.max_in_flight = st.max_in_flight.max(st.in_flight);
            st.gates.get(job_id).cloned()
        };
        if let Some(gate) = gate {
            // Closed on release; the permit is never granted otherwise.
            let _ = gate.acquire().await;
        }
        let reply = self.next_reply(job_id);
        self.lock().in_flight -= 1;
        reply.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_order_and_sticky_last() {
        let api = MockJobApi::new();
        api.push("j", MockReply::NotFound)
            .push("j", MockReply::processing(10.0, "a"));
        assert!(matches!(api.job_status("j").await, Err(JobApiError::NotFound)));
        assert_eq!(api.job_status("j").await.unwrap().percent, 10.0);
        assert_eq!(api.job_status("j").await.unwrap().percent, 10.0);
        assert_eq!(api.calls_for("j"), 3);
        assert!(matches!(api.job_status("other").await, Err(JobApiError::NotFound)));
    }

    #[tokio::test]
    async fn submit_records_body() {
        let api = MockJobApi::new();
        let id = api.submit_job(&serde_json::json!({"subject": "math"})).await.unwrap();
        assert_eq!(id, "mock-job-1");
        assert_eq!(api.submitted().len(), 1);
    }
}
