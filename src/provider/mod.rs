//! Seam to the external static-analysis service.

mod http;

pub use http::HttpAnalysisProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::AnalysisOutcome;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected provider payload: {0}")]
    Payload(String),
}

/// Code handed to the provider for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Stable key the provider groups runs under; the submission id, or a
    /// generated key for ad-hoc analyses.
    pub project_key: String,
    pub filename: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Queued or still running on the provider side.
    Running,
    Finished(AnalysisOutcome),
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Recorded as `analysisSource` on dispatched submissions.
    fn source(&self) -> &str;

    async fn submit(&self, request: AnalysisRequest) -> Result<JobHandle, ProviderError>;

    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError>;
}
