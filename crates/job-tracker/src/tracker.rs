//! JobProgressTracker: polls one job at a time until it succeeds, fails or times out.

use crate::classify::{classify, Outcome, PollState, COMPLETED_MESSAGE};
use crate::config::TrackerConfig;
use crate::scheduler::{PollScheduler, ScheduleHandle, Tick, TickFuture, TokioScheduler};
use crate::view::{FailureKind, TrackerView};
use chrono::Utc;
use job_types::{JobApi, StatusSnapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("job id must not be empty")]
    EmptyJobId,
    #[error("no tokio runtime available to drive polling")]
    NoRuntime,
}

#[derive(Default)]
struct TrackerState {
    job_id: Option<String>,
    /// Advanced on every reset; responses issued under an older epoch are dropped.
    epoch: u64,
    poll: PollState,
    status_data: Option<StatusSnapshot>,
    error: Option<String>,
    failure: Option<FailureKind>,
    is_complete: bool,
    updated_at: Option<String>,
    timer: Option<ScheduleHandle>,
}

impl TrackerState {
    fn project(&self) -> TrackerView {
        TrackerView {
            job_id: self.job_id.clone(),
            status_data: self.status_data.clone(),
            error: self.error.clone(),
            is_complete: self.is_complete,
            is_running: self.job_id.is_some() && !self.is_complete && self.error.is_none(),
            is_polling: self.timer.is_some(),
            failure: self.failure,
            attempts: self.poll.attempts,
            updated_at: self.updated_at.clone(),
        }
    }

    fn stop_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(mut timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Back to a freshly constructed state, under a new epoch. Dropping the old state
    /// cancels its timer.
    fn reset(&mut self) {
        *self = TrackerState {
            epoch: self.epoch.wrapping_add(1),
            ..TrackerState::default()
        };
    }

    fn succeed(&mut self) {
        self.is_complete = true;
        self.poll.has_completed = true;
        self.status_data = Some(StatusSnapshot::completed(COMPLETED_MESSAGE));
        self.stop_timer();
    }

    fn fail(&mut self, kind: FailureKind, message: String) {
        self.error = Some(message);
        self.failure = Some(kind);
        self.poll.has_completed = true;
        self.stop_timer();
    }
}

struct Inner {
    api: Arc<dyn JobApi>,
    scheduler: Arc<dyn PollScheduler>,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    view_tx: watch::Sender<TrackerView>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, st: &TrackerState) {
        self.view_tx.send_replace(st.project());
    }

    /// Timer callback. Holds only a weak reference so a dropped tracker stops polling.
    fn tick(self: &Arc<Self>) -> Tick {
        let weak = Arc::downgrade(self);
        Arc::new(move || -> TickFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.poll().await;
                }
            })
        })
    }

    async fn poll(&self) {
        let (job_id, epoch, attempts) = {
            let mut st = self.lock();
            let Some(job_id) = st.job_id.clone() else {
                return;
            };
            if st.poll.in_flight || st.poll.has_completed {
                return;
            }
            st.poll.in_flight = true;
            st.poll.attempts = st.poll.attempts.saturating_add(1);
            (job_id, st.epoch, st.poll.attempts)
        };
        tracing::debug!(job_id = %job_id, attempts, "polling job status");

        let result = self.api.job_status(&job_id).await;

        let mut st = self.lock();
        if st.epoch != epoch {
            tracing::warn!(job_id = %job_id, "discarding status response for a job no longer tracked");
            return;
        }
        st.poll.in_flight = false;
        if st.poll.has_completed {
            return;
        }
        if let Err(ref e) = result {
            if !e.is_not_found() {
                tracing::warn!(job_id = %job_id, error = %e, "job status request failed");
            }
        }

        st.updated_at = Some(Utc::now().to_rfc3339());
        match classify(&mut st.poll, &self.config, result) {
            Outcome::Pending => {
                tracing::debug!(job_id = %job_id, attempts, "job not visible yet");
            }
            Outcome::Progress(snapshot) => {
                tracing::debug!(
                    job_id = %job_id,
                    percent = snapshot.percent,
                    message = %snapshot.message,
                    "job progress"
                );
                st.status_data = Some(snapshot);
            }
            Outcome::Succeeded(received) => {
                let via = if received.is_some() { "status" } else { "cleanup" };
                tracing::info!(job_id = %job_id, via, "job completed");
                st.succeed();
            }
            Outcome::Failed {
                kind,
                message,
                snapshot,
            } => {
                tracing::warn!(job_id = %job_id, ?kind, error = %message, "job tracking failed");
                if let Some(snapshot) = snapshot {
                    st.status_data = Some(snapshot);
                }
                st.fail(kind, message);
            }
        }
        self.publish(&st);
    }
}

/// Tracks one asynchronous job at a time by polling its status endpoint.
///
/// Progress is observed through [`view`](Self::view) or [`subscribe`](Self::subscribe); the
/// tracker never returns errors from its polling loop, failures land in `TrackerView::error`.
pub struct JobProgressTracker {
    inner: Arc<Inner>,
}

impl JobProgressTracker {
    pub fn new(
        api: Arc<dyn JobApi>,
        scheduler: Arc<dyn PollScheduler>,
        config: TrackerConfig,
    ) -> Self {
        let (view_tx, _) = watch::channel(TrackerView::default());
        Self {
            inner: Arc::new(Inner {
                api,
                scheduler,
                config,
                state: Mutex::new(TrackerState::default()),
                view_tx,
            }),
        }
    }

    /// Tracker polling on the tokio runtime of the caller.
    pub fn on_current_runtime(
        api: Arc<dyn JobApi>,
        config: TrackerConfig,
    ) -> Result<Self, TrackerError> {
        let scheduler = TokioScheduler::try_current().ok_or(TrackerError::NoRuntime)?;
        Ok(Self::new(api, Arc::new(scheduler), config))
    }

    /// Start polling `job_id`.
    ///
    /// A different id than the one held resets everything first. The id already held is a
    /// no-op while it is polling or settled; if it was only stopped, polling resumes.
    pub fn start_tracking(&self, job_id: impl Into<String>) -> Result<(), TrackerError> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(TrackerError::EmptyJobId);
        }
        let mut st = self.inner.lock();
        if st.job_id.as_deref() == Some(job_id.as_str()) {
            if st.poll.has_completed || st.timer.is_some() {
                tracing::debug!(job_id = %job_id, "already tracking job");
                return Ok(());
            }
            tracing::info!(job_id = %job_id, "resuming job tracking");
        } else {
            if let Some(ref previous) = st.job_id {
                tracing::info!(previous = %previous, job_id = %job_id, "switching tracked job");
            } else {
                tracing::info!(job_id = %job_id, "tracking job");
            }
            st.reset();
            st.job_id = Some(job_id);
        }
        let tick = self.inner.tick();
        st.timer = Some(self.inner.scheduler.schedule(self.inner.config.poll_interval, tick));
        self.inner.publish(&st);
        Ok(())
    }

    /// Cancel the poll timer. Job id and last snapshot stay. Idempotent.
    pub fn stop_tracking(&self) {
        let mut st = self.inner.lock();
        if st.stop_timer() {
            tracing::info!(job_id = ?st.job_id, "stopped job tracking");
            self.inner.publish(&st);
        }
    }

    /// Stop and forget the current job.
    pub fn reset(&self) {
        let mut st = self.inner.lock();
        st.reset();
        self.inner.publish(&st);
    }

    pub fn view(&self) -> TrackerView {
        self.inner.view_tx.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.inner.view_tx.subscribe()
    }

    /// Wait until the job settles or polling stops; returns the last view.
    pub async fn wait_settled(&self) -> TrackerView {
        let mut rx = self.subscribe();
        loop {
            let view = rx.borrow_and_update().clone();
            if view.is_settled() || !view.is_polling {
                return view;
            }
            if rx.changed().await.is_err() {
                return self.view();
            }
        }
    }

    pub fn job_id(&self) -> Option<String> {
        self.inner.lock().job_id.clone()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }
}

impl Drop for JobProgressTracker {
    fn drop(&mut self) {
        self.inner.lock().stop_timer();
    }
}
