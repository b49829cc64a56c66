use tracing::{info, warn};

use super::{ensure_deletable, ensure_visible, load, record};
use crate::auth::Identity;
use crate::domain::{ActivityKind, NewActivity, Submission};
use crate::error::AppError;
use crate::state::AppState;

pub async fn details(state: &AppState, identity: &Identity, id: &str) -> Result<Submission, AppError> {
    let submission = load(state, id).await?;
    ensure_visible(identity, &submission)?;
    Ok(submission)
}

/// Students get only their own submissions back.
pub async fn list_by_project(
    state: &AppState,
    identity: &Identity,
    project_id: &str,
    task_id: Option<&str>,
) -> Result<Vec<Submission>, AppError> {
    let mut submissions = state.store.list_by_project(project_id, task_id).await?;
    if !identity.role.is_staff() {
        submissions.retain(|s| s.owner_id == identity.id);
    }
    Ok(submissions)
}

/// Stored payload of a submission.
pub async fn payload(
    state: &AppState,
    identity: &Identity,
    id: &str,
) -> Result<(Submission, Vec<u8>), AppError> {
    let submission = details(state, identity, id).await?;
    let bytes = state.storage.read(&submission.storage_key).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("payload of submission {}", id))
        } else {
            AppError::Io(e)
        }
    })?;
    Ok((submission, bytes))
}

/// Removes the record, its file entries and the stored payload.
pub async fn delete(state: &AppState, identity: &Identity, id: &str) -> Result<(), AppError> {
    let submission = load(state, id).await?;
    ensure_deletable(identity, &submission)?;

    if !state.store.delete(id).await? {
        return Err(AppError::not_found(id));
    }

    if let Err(e) = state.storage.remove(&submission.storage_key).await {
        warn!("Submission {} deleted but payload removal failed: {}", id, e);
    }

    info!("Submission {} deleted by {}", id, identity.id);
    record(
        state,
        NewActivity::new(ActivityKind::Delete, &submission.filename, id, &identity.id),
    )
    .await;

    Ok(())
}
