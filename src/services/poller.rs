use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{load, record, SYSTEM_ACTOR};
use crate::domain::{
    ActivityKind, AnalysisJob, AnalysisOutcome, NewActivity, Submission, SubmissionState,
    SubmissionStatus,
};
use crate::error::AppError;
use crate::provider::{AnalysisProvider, JobStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    /// Observations allowed after the first one.
    pub max_attempts: u32,
}

impl PollSchedule {
    /// Client-requested tightening of this schedule.
    ///
    /// Attempts never exceed `max_attempts`; the interval stays within
    /// `[interval / 10, interval]`.
    pub fn narrowed(self, max_attempts: Option<u32>, interval: Option<Duration>) -> PollSchedule {
        PollSchedule {
            interval: interval.map_or(self.interval, |i| {
                i.clamp(self.interval / 10, self.interval)
            }),
            max_attempts: max_attempts.map_or(self.max_attempts, |n| n.min(self.max_attempts)),
        }
    }
}

/// One observation of a submission's analysis.
///
/// Finished submissions come straight from the store. `Processing` ones ask
/// the provider once; a terminal answer is written only while the stored
/// status is still `Processing`, so concurrent pollers settle it once.
pub async fn poll_once(state: &AppState, id: &str, actor: &str) -> Result<Submission, AppError> {
    let submission = load(state, id).await?;

    let job = match &submission.state {
        SubmissionState::Uploaded => {
            return Err(AppError::StateConflict(format!(
                "submission {} has not been dispatched for analysis",
                id
            )))
        }
        SubmissionState::Processing { job } => job.clone(),
        _ => return Ok(submission),
    };

    match state.provider.status(&job.job_id).await? {
        JobStatus::Running => Ok(submission),
        JobStatus::Finished(outcome) => settle(state, submission, job, outcome, actor).await,
    }
}

async fn settle(
    state: &AppState,
    submission: Submission,
    job: AnalysisJob,
    outcome: AnalysisOutcome,
    actor: &str,
) -> Result<Submission, AppError> {
    let detail = match &outcome {
        AnalysisOutcome::Completed { result } => {
            format!("analysis completed with score {}", result.score.value())
        }
        AnalysisOutcome::Failed { reason } => format!("analysis failed: {}", reason),
    };
    let next = SubmissionState::settle(job, outcome);

    let applied = state
        .store
        .update_state(&submission.id, &[SubmissionStatus::Processing], &next)
        .await?;

    if applied {
        info!("Submission {} is now {}: {}", submission.id, next.status(), detail);
        record(
            state,
            NewActivity::new(ActivityKind::Update, &submission.filename, &submission.id, actor)
                .with_detail(detail),
        )
        .await;
    } else {
        debug!("Submission {} was settled by another poller", submission.id);
    }

    load(state, &submission.id).await
}

/// Polls until the submission leaves `Processing` or the schedule runs out.
///
/// Running out yields [`AppError::Timeout`] and leaves the stored status
/// alone; the provider job keeps running and a later poll can still settle it.
pub async fn poll_until_settled(
    state: &AppState,
    id: &str,
    schedule: PollSchedule,
    actor: &str,
) -> Result<Submission, AppError> {
    let mut remaining = schedule.max_attempts;
    loop {
        let submission = poll_once(state, id, actor).await?;
        if submission.status() != SubmissionStatus::Processing {
            return Ok(submission);
        }
        if remaining == 0 {
            return Err(AppError::Timeout {
                id: id.to_string(),
                attempts: schedule.max_attempts + 1,
            });
        }
        remaining -= 1;
        tokio::time::sleep(schedule.interval).await;
    }
}

/// Background task that follows a freshly dispatched submission.
pub fn spawn_poller(state: Arc<AppState>, id: String, schedule: PollSchedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(schedule.interval).await;
        match poll_until_settled(&state, &id, schedule, SYSTEM_ACTOR).await {
            Ok(submission) => {
                debug!("Background poller for {} finished at {}", id, submission.status())
            }
            Err(AppError::Timeout { attempts, .. }) => warn!(
                "Background poller for {} gave up after {} attempts; job left running",
                id, attempts
            ),
            Err(AppError::NotFound(_)) => debug!("Submission {} was deleted while polling", id),
            Err(e) => error!("Background poller for {} stopped: {}", id, e),
        }
    })
}

/// Waits on a provider job that is not tied to a submission.
pub async fn await_job(
    provider: &dyn AnalysisProvider,
    job_id: &str,
    schedule: PollSchedule,
) -> Result<AnalysisOutcome, AppError> {
    let mut remaining = schedule.max_attempts;
    loop {
        if let JobStatus::Finished(outcome) = provider.status(job_id).await? {
            return Ok(outcome);
        }
        if remaining == 0 {
            return Err(AppError::Timeout {
                id: job_id.to_string(),
                attempts: schedule.max_attempts + 1,
            });
        }
        remaining -= 1;
        tokio::time::sleep(schedule.interval).await;
    }
}
