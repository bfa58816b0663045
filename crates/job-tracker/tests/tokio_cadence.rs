//! Polling cadence on the tokio scheduler, with paused time.

use async_trait::async_trait;
use job_client::{MockJobApi, MockReply};
use job_tracker::{
    FailureKind, JobApi, JobApiError, JobProgressTracker, JobStatus, StatusSnapshot,
    TrackerConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn tracker(api: Arc<dyn JobApi>) -> JobProgressTracker {
    JobProgressTracker::on_current_runtime(api, TrackerConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_poll_is_immediate_then_every_second() {
    let api = Arc::new(MockJobApi::new());
    api.push("job", MockReply::processing(10.0, "Importing"));
    let t = tracker(Arc::clone(&api) as Arc<dyn JobApi>);
    t.start_tracking("job").unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(api.calls_for("job"), 1);
    assert_eq!(t.view().percent(), 10.0);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(api.calls_for("job"), 4);
}

#[tokio::test(start_paused = true)]
async fn startup_timeout_after_45_seconds() {
    let api = Arc::new(MockJobApi::new());
    let t = tracker(Arc::clone(&api) as Arc<dyn JobApi>);
    t.start_tracking("never-started").unwrap();

    tokio::time::sleep(Duration::from_millis(44_500)).await;
    assert!(t.view().error.is_none());

    let v = t.wait_settled().await;
    assert_eq!(v.failure, Some(FailureKind::StartupTimeout));
    assert_eq!(api.calls_for("never-started"), 46);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.calls_for("never-started"), 46);
}

#[tokio::test(start_paused = true)]
async fn stop_tracking_halts_timer() {
    let api = Arc::new(MockJobApi::new());
    api.push("job", MockReply::processing(10.0, "Importing"));
    let t = tracker(Arc::clone(&api) as Arc<dyn JobApi>);
    t.start_tracking("job").unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(api.calls_for("job"), 2);

    t.stop_tracking();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.calls_for("job"), 2);
    assert_eq!(t.view().job_id.as_deref(), Some("job"));
}

/// Status endpoint that takes longer to answer than the poll interval.
struct SlowApi {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl JobApi for SlowApi {
    async fn submit_job(&self, _body: &serde_json::Value) -> Result<String, JobApiError> {
        Ok("slow".to_string())
    }

    async fn job_status(&self, _job_id: &str) -> Result<StatusSnapshot, JobApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let percent = (n as f64 * 20.0).min(100.0);
        Ok(StatusSnapshot::new(JobStatus::Processing, percent, format!("step {n}")))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_responses_never_overlap() {
    let api = Arc::new(SlowApi {
        delay: Duration::from_millis(3500),
        calls: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let t = tracker(Arc::clone(&api) as Arc<dyn JobApi>);
    t.start_tracking("job").unwrap();

    let v = tokio::time::timeout(Duration::from_secs(60), t.wait_settled())
        .await
        .unwrap();
    assert!(v.is_complete);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(api.calls.load(Ordering::SeqCst), 5);
}
