use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{AnalysisProvider, AnalysisRequest, JobHandle, JobStatus, ProviderError};
use crate::domain::{AnalysisOutcome, AnalysisResult};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RemoteStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: RemoteStatus,
    result: Option<AnalysisResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: Option<String>,
}

/// Talks to a SonarQube-style analysis API over HTTP.
pub struct HttpAnalysisProvider {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    source: String,
    backoff: Duration,
}

impl HttpAnalysisProvider {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        source: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            source: source.to_string(),
            backoff: Duration::from_secs(2),
        })
    }

    /// Initial delay between retries; doubles on every attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request built by `build`, retrying rate limits and server
    /// errors with exponential backoff. Returns the body of the first 2xx.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<String, ProviderError>
    where
        F: Fn() -> Result<RequestBuilder, ProviderError>,
    {
        let mut retry_count = 0;
        let mut backoff = self.backoff;

        loop {
            let response = self.authorize(build()?).send().await?;
            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                return Ok(text);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || retry_count >= MAX_RETRIES {
                let message = serde_json::from_str::<RemoteError>(&text)
                    .ok()
                    .and_then(|e| e.message)
                    .unwrap_or(text);
                return Err(ProviderError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }

            retry_count += 1;
            warn!(
                "{} got {} from analysis provider, retry {}/{} in {:?}",
                what, status, retry_count, MAX_RETRIES, backoff
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    fn source(&self) -> &str {
        &self.source
    }

    async fn submit(&self, request: AnalysisRequest) -> Result<JobHandle, ProviderError> {
        let url = format!("{}/api/analyses", self.base_url);
        let mime = mime_guess::from_path(&request.filename)
            .first_raw()
            .unwrap_or("application/octet-stream");

        info!(
            "Submitting {} ({} bytes) to {} for analysis",
            request.filename,
            request.payload.len(),
            self.source
        );

        let body = self
            .send_with_retry("submit", || {
                let part = multipart::Part::bytes(request.payload.clone())
                    .file_name(request.filename.clone())
                    .mime_str(mime)?;
                let form = multipart::Form::new()
                    .text("projectKey", request.project_key.clone())
                    .part("file", part);
                Ok(self.client.post(&url).multipart(form))
            })
            .await?;

        let parsed: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Payload(e.to_string()))?;

        Ok(JobHandle {
            job_id: parsed.job_id,
        })
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let url = format!("{}/api/analyses/{}", self.base_url, job_id);
        let body = self
            .send_with_retry("status", || Ok(self.client.get(&url)))
            .await?;

        let parsed: StatusResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Payload(e.to_string()))?;

        match parsed.status {
            RemoteStatus::Pending | RemoteStatus::Running => Ok(JobStatus::Running),
            RemoteStatus::Succeeded => {
                let mut result = parsed.result.ok_or_else(|| {
                    ProviderError::Payload(format!("job {} succeeded without a result", job_id))
                })?;
                if result.source.is_empty() {
                    result.source = self.source.clone();
                }
                Ok(JobStatus::Finished(AnalysisOutcome::Completed { result }))
            }
            RemoteStatus::Failed => Ok(JobStatus::Finished(AnalysisOutcome::Failed {
                reason: parsed
                    .error
                    .unwrap_or_else(|| "analysis failed without a reason".to_string()),
            })),
        }
    }
}
