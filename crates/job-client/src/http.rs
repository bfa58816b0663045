//! HTTP client for the job API (`POST /import`, `GET /status/{jobId}`).

use job_types::{ErrorBody, JobApi, JobApiError, StartJobResponse, StatusSnapshot};
use reqwest::{StatusCode, Url};

/// Paths of the start and status endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoutes {
    pub start_path: String,
    pub status_path: String,
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self {
            start_path: "import".to_string(),
            status_path: "status".to_string(),
        }
    }
}

/// Where and how to reach the job API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub routes: ApiRoutes,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            routes: ApiRoutes::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `JOB_API_URL`, `JOB_API_TOKEN`, `JOB_START_PATH` and
    /// `JOB_STATUS_PATH`. Empty values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(url) = value("JOB_API_URL") {
            cfg.base_url = url;
        }
        cfg.api_key = value("JOB_API_TOKEN");
        if let Some(p) = value("JOB_START_PATH") {
            cfg.routes.start_path = p;
        }
        if let Some(p) = value("JOB_STATUS_PATH") {
            cfg.routes.status_path = p;
        }
        cfg
    }
}

/// `JobApi` over HTTP. A bearer token, when set, is attached to every request.
pub struct HttpJobClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    routes: ApiRoutes,
}

impl HttpJobClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, JobApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| JobApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(JobApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            routes: ApiRoutes::default(),
        })
    }

    pub fn with_routes(mut self, routes: ApiRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn from_config(cfg: ClientConfig) -> Result<Self, JobApiError> {
        Ok(Self::new(&cfg.base_url, cfg.api_key)?.with_routes(cfg.routes))
    }

    /// Base URL joined with the segments of `path`, then `extra` (each percent-encoded).
    fn endpoint(&self, path: &str, extra: Option<&str>) -> Result<Url, JobApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| JobApiError::InvalidUrl(self.base_url.to_string()))?;
            segs.pop_if_empty();
            segs.extend(path.split('/').filter(|s| !s.is_empty()));
            if let Some(extra) = extra {
                segs.push(extra);
            }
        }
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(parsed) => parsed.into_message(),
        Err(_) => Some(trimmed.to_string()),
    }
}

async fn read_body(res: reqwest::Response) -> Result<(StatusCode, String), JobApiError> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| JobApiError::Transport(e.to_string()))?;
    Ok((status, body))
}

#[async_trait::async_trait]
impl JobApi for HttpJobClient {
    async fn submit_job(&self, body: &serde_json::Value) -> Result<String, JobApiError> {
        let url = self.endpoint(&self.routes.start_path, None)?;
        tracing::debug!(%url, "submitting job");
        let res = self
            .authorize(self.client.post(url).json(body))
            .send()
            .await
            .map_err(|e| JobApiError::Transport(e.to_string()))?;
        let (status, text) = read_body(res).await?;
        if !status.is_success() {
            return Err(JobApiError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        let parsed: StartJobResponse =
            serde_json::from_str(&text).map_err(|e| JobApiError::Decode(e.to_string()))?;
        if parsed.job_id.is_empty() {
            return Err(JobApiError::Decode("empty jobId".to_string()));
        }
        Ok(parsed.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusSnapshot, JobApiError> {
        let url = self.endpoint(&self.routes.status_path, Some(job_id))?;
        let res = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| JobApiError::Transport(e.to_string()))?;
        // Before reading the body: a 404 with a broken body is still a 404.
        if res.status() == StatusCode::NOT_FOUND {
            return Err(JobApiError::NotFound);
        }
        let (status, text) = read_body(res).await?;
        if !status.is_success() {
            return Err(JobApiError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        serde_json::from_str(&text).map_err(|e| JobApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_segments() {
        let c = HttpJobClient::new("https://api.example.com/v1/", None).unwrap();
        let url = c.endpoint("status", Some("job 1/a")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/status/job%201%2Fa");
        let url = c.endpoint("/subjects/import", None).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/subjects/import");
    }

    #[test]
    fn endpoint_without_base_path() {
        let c = HttpJobClient::new("http://localhost:3000", None).unwrap();
        let url = c.endpoint("status", Some("abc")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/status/abc");
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(matches!(
            HttpJobClient::new("mailto:ops@example.com", None),
            Err(JobApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpJobClient::new("not a url", None),
            Err(JobApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn client_config_from_lookup() {
        let vars = [
            ("JOB_API_URL", "https://jobs.example.com/api/"),
            ("JOB_API_TOKEN", "t0ken"),
            ("JOB_STATUS_PATH", "jobs/status"),
            ("JOB_START_PATH", " "),
        ];
        let cfg = ClientConfig::from_lookup(|k: &str| {
            vars.iter().find(|(key, _)| *key == k).map(|(_, v)| v.to_string())
        });
        assert_eq!(cfg.base_url, "https://jobs.example.com/api/");
        assert_eq!(cfg.api_key.as_deref(), Some("t0ken"));
        assert_eq!(cfg.routes.start_path, "import");
        assert_eq!(cfg.routes.status_path, "jobs/status");

        let cfg = ClientConfig::from_lookup(|_: &str| None);
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn from_config_applies_routes() {
        let cfg = ClientConfig {
            base_url: "http://localhost:9000/v2".to_string(),
            api_key: None,
            routes: ApiRoutes {
                start_path: "quests/generate".to_string(),
                status_path: "quests/status".to_string(),
            },
        };
        let c = HttpJobClient::from_config(cfg).unwrap();
        let url = c.endpoint(&c.routes.status_path, Some("q1")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/v2/quests/status/q1");

        let bad = ClientConfig {
            base_url: "nope".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            HttpJobClient::from_config(bad),
            Err(JobApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn error_message_sources() {
        assert_eq!(error_message(""), None);
        assert_eq!(error_message("  upstream down \n").as_deref(), Some("upstream down"));
        assert_eq!(
            error_message(r#"{"message":"Subject not found"}"#).as_deref(),
            Some("Subject not found")
        );
        assert_eq!(error_message(r#"{"detail":"x"}"#), None);
    }
}
