use chrono::Utc;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ensure_visible, load, poller, record};
use crate::auth::Identity;
use crate::domain::{
    ActivityKind, AnalysisJob, NewActivity, Submission, SubmissionState, SubmissionStatus,
};
use crate::error::AppError;
use crate::provider::AnalysisRequest;
use crate::state::AppState;

/// Sends an `Uploaded` submission to the analysis provider.
///
/// Anything other than `Uploaded` fails fast with a state conflict and no
/// provider job is created. A provider failure leaves the submission
/// `Uploaded` so the caller can try again.
pub async fn dispatch(
    state: &Arc<AppState>,
    identity: &Identity,
    id: &str,
) -> Result<Submission, AppError> {
    let submission = load(state, id).await?;
    ensure_visible(identity, &submission)?;

    if submission.status() != SubmissionStatus::Uploaded {
        return Err(AppError::StateConflict(format!(
            "submission {} is {}; only Uploaded submissions can be dispatched",
            id,
            submission.status()
        )));
    }

    start_analysis(state, identity, submission).await
}

/// Restarts analysis of a finished submission at `Processing`.
///
/// A reviewed submission carries a tutor's sign-off, so only staff may
/// restart it.
pub async fn reanalyze(
    state: &Arc<AppState>,
    identity: &Identity,
    id: &str,
) -> Result<Submission, AppError> {
    let submission = load(state, id).await?;
    ensure_visible(identity, &submission)?;

    if !submission.status().is_terminal() {
        return Err(AppError::StateConflict(format!(
            "submission {} is {}; only finished submissions can be re-analyzed",
            id,
            submission.status()
        )));
    }
    if submission.status() == SubmissionStatus::Reviewed {
        identity.require_staff("re-analyze a reviewed submission")?;
    }

    start_analysis(state, identity, submission).await
}

async fn start_analysis(
    state: &Arc<AppState>,
    identity: &Identity,
    submission: Submission,
) -> Result<Submission, AppError> {
    let current = submission.status();
    current.ensure_transition(SubmissionStatus::Processing)?;

    let payload = state
        .storage
        .read(&submission.storage_key)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::Internal(format!(
                "stored payload for submission {} is missing",
                submission.id
            )),
            _ => AppError::Io(e),
        })?;

    let handle = state
        .provider
        .submit(AnalysisRequest {
            project_key: submission.id.clone(),
            filename: submission.filename.clone(),
            payload,
        })
        .await
        .map_err(|e| {
            warn!("Dispatch of submission {} failed: {}", submission.id, e);
            AppError::Upstream(e)
        })?;

    let job = AnalysisJob {
        analysis_source: state.provider.source().to_string(),
        job_id: handle.job_id,
        dispatched_at: Utc::now(),
    };
    let next = SubmissionState::Processing { job: job.clone() };

    if !state.store.update_state(&submission.id, &[current], &next).await? {
        warn!(
            "Submission {} changed while dispatching; provider job {} is orphaned",
            submission.id, job.job_id
        );
        return Err(AppError::StateConflict(format!(
            "submission {} was modified concurrently",
            submission.id
        )));
    }

    info!(
        "Submission {} dispatched to {} as job {}",
        submission.id, job.analysis_source, job.job_id
    );

    let verb = if current == SubmissionStatus::Uploaded {
        "dispatched"
    } else {
        "re-dispatched"
    };
    record(
        state,
        NewActivity::new(ActivityKind::Update, &submission.filename, &submission.id, &identity.id)
            .with_detail(format!("{} to {} as job {}", verb, job.analysis_source, job.job_id)),
    )
    .await;

    if state.config.auto_poll {
        poller::spawn_poller(state.clone(), submission.id.clone(), state.poll_schedule());
    }

    load(state, &submission.id).await
}
