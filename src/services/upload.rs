use chrono::Utc;
use tracing::{info, warn};

use super::record;
use crate::auth::Identity;
use crate::domain::{ActivityKind, FileEntry, NewActivity, Submission, SubmissionKind, SubmissionState};
use crate::error::AppError;
use crate::files::{self, Language};
use crate::state::AppState;
use crate::storage::{generate_submission_id, LocalStorage};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub payload: Vec<u8>,
    pub project_id: String,
    pub task_id: Option<String>,
    /// Upload on behalf of another user; staff only.
    pub owner_id: Option<String>,
}

fn is_zip(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".zip")
}

/// Works out what kind of submission the payload is and lists its files.
fn inspect(filename: &str, payload: &[u8]) -> Result<(SubmissionKind, Vec<FileEntry>), AppError> {
    if is_zip(filename) {
        return Ok((SubmissionKind::Archive, files::list_entries(payload)?));
    }

    let language = Language::detect(filename);
    if !language.is_source() {
        return Err(AppError::Validation(format!(
            "unsupported file type for '{}'; upload a source file or a .zip archive",
            filename
        )));
    }

    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .to_string();

    Ok((
        SubmissionKind::File,
        vec![FileEntry {
            path: name.clone(),
            name,
            language,
            size: payload.len() as u64,
            analysis: None,
        }],
    ))
}

pub async fn upload(
    state: &AppState,
    identity: &Identity,
    request: UploadRequest,
) -> Result<Submission, AppError> {
    let project_id = request.project_id.trim().to_string();
    if project_id.is_empty() {
        return Err(AppError::Validation("projectId is required".to_string()));
    }

    let filename = request.filename.trim().to_string();
    if filename.is_empty() {
        return Err(AppError::Validation("file name is required".to_string()));
    }

    if request.payload.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }

    let ceiling = state.config.max_upload_bytes;
    if request.payload.len() > ceiling {
        return Err(AppError::Validation(format!(
            "file is {} bytes, the limit is {} bytes",
            request.payload.len(),
            ceiling
        )));
    }

    let owner_id = request
        .owner_id
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| identity.id.clone());
    if owner_id != identity.id {
        identity.require_staff("upload on behalf of another user")?;
    }

    let (kind, files) = inspect(&filename, &request.payload)?;

    let id = generate_submission_id();
    let storage_key = LocalStorage::key_for(&id, &filename);
    state.storage.save(&storage_key, &request.payload).await?;

    let now = Utc::now();
    let submission = Submission {
        id,
        project_id,
        task_id: request.task_id.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        owner_id,
        filename,
        storage_key,
        kind,
        state: SubmissionState::Uploaded,
        files,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.insert(&submission).await {
        if let Err(cleanup) = state.storage.remove(&submission.storage_key).await {
            warn!("Could not remove orphaned payload {}: {}", submission.storage_key, cleanup);
        }
        return Err(e);
    }

    info!(
        "Stored submission {} ({}, {} files) for project {}",
        submission.id,
        submission.kind.as_str(),
        submission.files.len(),
        submission.project_id
    );

    record(
        state,
        NewActivity::new(ActivityKind::Create, &submission.filename, &submission.id, &identity.id),
    )
    .await;

    Ok(submission)
}
