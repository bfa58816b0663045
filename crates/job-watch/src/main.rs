//! job-watch: optionally start a background job, then follow it until it settles.

use clap::Parser;
use job_client::{ClientConfig, HttpJobClient};
use job_tracker::{JobProgressTracker, MissingJobPolicy, TrackerConfig, TrackerError, TrackerView};
use job_types::{JobApi, JobApiError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "job-watch")]
#[command(about = "Follow a background import job until it succeeds or fails")]
struct Args {
    /// Job to track. Omit when using --start.
    job_id: Option<String>,

    /// Start a job with the JSON body in FILE ("-" reads stdin), then track it
    #[arg(long, value_name = "FILE", conflicts_with = "job_id")]
    start: Option<PathBuf>,

    /// Base URL of the job API; overrides JOB_API_URL
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token attached to every request; overrides JOB_API_TOKEN
    #[arg(long)]
    token: Option<String>,

    /// Path of the start endpoint; overrides JOB_START_PATH
    #[arg(long)]
    start_path: Option<String>,

    /// Path of the status endpoint; overrides JOB_STATUS_PATH
    #[arg(long)]
    status_path: Option<String>,

    /// Milliseconds between polls; overrides JOB_POLL_INTERVAL_MS
    #[arg(long = "interval-ms")]
    poll_interval_ms: Option<u64>,

    /// Polls without a status response before giving up; overrides JOB_STARTUP_TIMEOUT_POLLS
    #[arg(long = "startup-polls")]
    startup_timeout_polls: Option<u32>,

    /// Polls in Processing before giving up; overrides JOB_PROCESSING_TIMEOUT_POLLS
    #[arg(long = "processing-polls")]
    processing_timeout_polls: Option<u32>,

    /// Meaning of a vanished job once seen: "completed" or "fail"; overrides JOB_MISSING_POLICY
    #[arg(long = "missing")]
    missing_policy: Option<MissingJobPolicy>,

    /// Print the final tracker view as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    /// `base` (normally from the environment) with command-line flags applied on top.
    fn tracker_config(&self, mut base: TrackerConfig) -> TrackerConfig {
        if let Some(ms) = self.poll_interval_ms {
            base.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = self.startup_timeout_polls {
            base.startup_timeout_polls = n;
        }
        if let Some(n) = self.processing_timeout_polls {
            base.processing_timeout_polls = n;
        }
        if let Some(policy) = self.missing_policy {
            base.missing_job_policy = policy;
        }
        base
    }

    fn client_config(&self, mut base: ClientConfig) -> ClientConfig {
        if let Some(ref url) = self.api_url {
            base.base_url = url.clone();
        }
        if let Some(ref token) = self.token {
            base.api_key = Some(token.clone());
        }
        if let Some(ref p) = self.start_path {
            base.routes.start_path = p.clone();
        }
        if let Some(ref p) = self.status_path {
            base.routes.status_path = p.clone();
        }
        base
    }
}

#[derive(Debug, thiserror::Error)]
enum WatchError {
    #[error("a job id or --start <FILE> is required")]
    MissingJob,
    #[error("reading job request: {0}")]
    Io(#[from] std::io::Error),
    #[error("job request is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] JobApiError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let json = args.json;
    match run(args).await {
        Ok(view) => {
            if json {
                match serde_json::to_string_pretty(&view) {
                    Ok(out) => println!("{out}"),
                    Err(e) => tracing::error!(error = %e, "failed to encode tracker view"),
                }
            }
            if view.is_complete {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "job-watch failed");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<TrackerView, WatchError> {
    let client = HttpJobClient::from_config(args.client_config(ClientConfig::from_env()))?;
    let api: Arc<dyn JobApi> = Arc::new(client);

    let job_id = match (&args.start, &args.job_id) {
        (Some(path), _) => {
            let body = read_request(path).await?;
            let job_id = api.submit_job(&body).await?;
            tracing::info!(job_id = %job_id, "job started");
            job_id
        }
        (None, Some(job_id)) => job_id.clone(),
        (None, None) => return Err(WatchError::MissingJob),
    };

    let config = args.tracker_config(TrackerConfig::from_env());
    let tracker = JobProgressTracker::on_current_runtime(api, config)?;
    let mut rx = tracker.subscribe();
    tracker.start_tracking(job_id)?;
    let view = follow(&tracker, &mut rx, tokio::signal::ctrl_c()).await;

    match (&view.error, view.is_complete) {
        (_, true) => tracing::info!(job_id = ?view.job_id, "job completed"),
        (Some(error), _) => {
            tracing::error!(job_id = ?view.job_id, failure = ?view.failure, error = %error, "job failed")
        }
        (None, false) => tracing::warn!(job_id = ?view.job_id, "stopped before the job settled"),
    }
    Ok(view)
}

async fn read_request(path: &Path) -> Result<serde_json::Value, WatchError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(path).await?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Log progress as it changes; `interrupt` (Ctrl-C in `run`) stops tracking.
async fn follow<F: Future>(
    tracker: &JobProgressTracker,
    rx: &mut watch::Receiver<TrackerView>,
    interrupt: F,
) -> TrackerView {
    let mut last = None;
    tokio::pin!(interrupt);
    loop {
        let view = rx.borrow_and_update().clone();
        if let Some(line) = progress_line(&view, &mut last) {
            tracing::info!(job_id = ?view.job_id, "{}", line);
        }
        if view.is_settled() || !view.is_polling {
            return view;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return tracker.view();
                }
            }
            _ = &mut interrupt => {
                tracing::warn!("interrupted");
                tracker.stop_tracking();
                return tracker.view();
            }
        }
    }
}

/// A line to print when percent or message moved since `last`.
fn progress_line(view: &TrackerView, last: &mut Option<(u32, String)>) -> Option<String> {
    let snapshot = view.status_data.as_ref()?;
    let percent = snapshot.clamped_percent().round() as u32;
    let current = (percent, snapshot.message.clone());
    if last.as_ref() == Some(&current) {
        return None;
    }
    *last = Some(current);
    Some(format!("{:>3}% {}", percent, snapshot.message))
}
