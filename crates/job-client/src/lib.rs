//! HTTP client for the job start/status API.

mod http;
#[cfg(feature = "test-util")]
pub mod mock;

pub use http::{ApiRoutes, ClientConfig, HttpJobClient};
pub use job_types::{JobApi, JobApiError};

#[cfg(feature = "test-util")]
pub use mock::{MockJobApi, MockReply};
