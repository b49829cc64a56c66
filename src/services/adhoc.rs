use serde::Deserialize;
use tracing::info;

use super::poller::await_job;
use crate::auth::Identity;
use crate::domain::AnalysisOutcome;
use crate::error::AppError;
use crate::files::Language;
use crate::provider::AnalysisRequest;
use crate::state::AppState;
use crate::storage::generate_submission_id;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnalysisRequest {
    pub filename: String,
    pub content: String,
}

/// Analyses one piece of code without creating a submission.
pub async fn analyze_code(
    state: &AppState,
    identity: &Identity,
    request: CodeAnalysisRequest,
) -> Result<AnalysisOutcome, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::Validation("content is empty".to_string()));
    }
    if request.content.len() > state.config.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "content is {} bytes, the limit is {} bytes",
            request.content.len(),
            state.config.max_upload_bytes
        )));
    }
    if !Language::detect(&request.filename).is_source() {
        return Err(AppError::Validation(format!(
            "unsupported file type for '{}'",
            request.filename
        )));
    }

    let handle = state
        .provider
        .submit(AnalysisRequest {
            project_key: format!("adhoc_{}", generate_submission_id()),
            filename: request.filename.clone(),
            payload: request.content.into_bytes(),
        })
        .await?;

    info!(
        "Ad-hoc analysis of {} for {} running as job {}",
        request.filename, identity.id, handle.job_id
    );

    await_job(state.provider.as_ref(), &handle.job_id, state.poll_schedule()).await
}
