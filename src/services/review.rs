use chrono::Utc;
use tracing::info;

use super::{load, record};
use crate::auth::Identity;
use crate::domain::{ActivityKind, NewActivity, Submission, SubmissionState, SubmissionStatus};
use crate::error::AppError;
use crate::state::AppState;

/// Tutor sign-off on a finished analysis.
pub async fn review(
    state: &AppState,
    identity: &Identity,
    id: &str,
    note: Option<String>,
) -> Result<Submission, AppError> {
    identity.require_staff("review submissions")?;

    let submission = load(state, id).await?;
    let current = submission.status();
    current.ensure_transition(SubmissionStatus::Reviewed)?;

    let (Some(job), Some(outcome)) = (submission.state.job(), submission.state.outcome()) else {
        return Err(AppError::Internal(format!(
            "submission {} is {} without an analysis outcome",
            id, current
        )));
    };

    let next = SubmissionState::Reviewed {
        job: job.clone(),
        outcome,
        reviewed_by: identity.id.clone(),
        note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        reviewed_at: Utc::now(),
    };

    if !state.store.update_state(id, &[current], &next).await? {
        return Err(AppError::StateConflict(format!(
            "submission {} was modified concurrently",
            id
        )));
    }

    info!("Submission {} reviewed by {}", id, identity.id);
    record(
        state,
        NewActivity::new(ActivityKind::Update, &submission.filename, id, &identity.id)
            .with_detail("reviewed"),
    )
    .await;

    load(state, id).await
}
