//! Background-job progress tracker: polls a job status endpoint until the job settles.

mod classify;
mod config;
mod scheduler;
mod tracker;
mod view;

pub use config::{MissingJobPolicy, TrackerConfig};
pub use job_types::{JobApi, JobApiError, JobStatus, StatusSnapshot};
pub use scheduler::{ManualScheduler, PollScheduler, ScheduleHandle, Tick, TickFuture, TokioScheduler};
pub use tracker::{JobProgressTracker, TrackerError};
pub use view::{FailureKind, TrackerView};
