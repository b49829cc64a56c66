//! Submission lifecycle operations. Handlers stay thin and call into these.

pub mod adhoc;
pub mod dispatcher;
pub mod poller;
pub mod review;
pub mod submissions;
pub mod upload;

pub use poller::PollSchedule;

use tracing::warn;

use crate::auth::{Identity, Role};
use crate::domain::{NewActivity, Submission};
use crate::error::AppError;
use crate::state::AppState;

/// Actor recorded for changes made by background tasks.
pub const SYSTEM_ACTOR: &str = "system";

/// Appends an audit entry. The audit trail is not a source of truth, so a
/// failed append is logged and the surrounding operation still succeeds.
pub(crate) async fn record(state: &AppState, activity: NewActivity) {
    let kind = activity.kind;
    let subject = activity.submission_id.clone().unwrap_or_default();
    if let Err(e) = state.activities.append(activity).await {
        warn!(
            "Failed to append {} activity for submission {}: {}",
            kind.as_str(),
            subject,
            e
        );
    }
}

pub(crate) async fn load(state: &AppState, id: &str) -> Result<Submission, AppError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(id))
}

/// Students only see their own work; staff see everything.
pub(crate) fn ensure_visible(identity: &Identity, submission: &Submission) -> Result<(), AppError> {
    if identity.role.is_staff() || identity.id == submission.owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "submission {} belongs to another user",
            submission.id
        )))
    }
}

/// Deletion is reserved for the owner and managers.
pub(crate) fn ensure_deletable(identity: &Identity, submission: &Submission) -> Result<(), AppError> {
    if identity.role == Role::Manager || identity.id == submission.owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only the owner or a manager may delete submission {}",
            submission.id
        )))
    }
}
