use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::domain::{
    Activity, ActivityKind, AnalysisJob, AnalysisOutcome, AnalysisResult, FileAnalysis,
    FileEntry, Submission, SubmissionKind, SubmissionState, SubmissionStatus,
};
use crate::error::AppError;
use crate::files::Language;

#[derive(Debug, FromRow)]
pub struct SubmissionRow {
    pub submission_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub owner_id: String,
    pub filename: String,
    pub storage_key: String,
    pub kind: String,
    pub status: String,
    pub analysis_source: Option<String>,
    pub job_id: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub result: Option<Json<AnalysisResult>>,
    pub failure_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct FileRow {
    pub submission_id: String,
    pub name: String,
    pub path: String,
    pub language: String,
    pub size_bytes: i64,
    pub analysis: Option<Json<FileAnalysis>>,
}

#[derive(Debug, FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub kind: String,
    pub filename: String,
    pub submission_id: Option<String>,
    pub actor: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The lifecycle state spread over nullable columns.
#[derive(Debug, Default)]
pub struct StateColumns {
    pub status: String,
    pub analysis_source: Option<String>,
    pub job_id: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub result: Option<AnalysisResult>,
    pub failure_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<&SubmissionState> for StateColumns {
    fn from(state: &SubmissionState) -> Self {
        let mut columns = StateColumns {
            status: state.status().as_str().to_string(),
            ..Default::default()
        };

        if let Some(job) = state.job() {
            columns.analysis_source = Some(job.analysis_source.clone());
            columns.job_id = Some(job.job_id.clone());
            columns.dispatched_at = Some(job.dispatched_at);
        }

        match state.outcome() {
            Some(AnalysisOutcome::Completed { result }) => columns.result = Some(result),
            Some(AnalysisOutcome::Failed { reason }) => columns.failure_reason = Some(reason),
            None => {}
        }

        if let SubmissionState::Reviewed {
            reviewed_by,
            note,
            reviewed_at,
            ..
        } = state
        {
            columns.reviewed_by = Some(reviewed_by.clone());
            columns.review_note = note.clone();
            columns.reviewed_at = Some(*reviewed_at);
        }

        columns
    }
}

impl StateColumns {
    pub fn into_state(self, submission_id: &str) -> Result<SubmissionState, AppError> {
        let corrupt = |what: &str| {
            AppError::Internal(format!("submission {} row is missing {}", submission_id, what))
        };

        let status: SubmissionStatus = self.status.parse()?;
        if status == SubmissionStatus::Uploaded {
            return Ok(SubmissionState::Uploaded);
        }

        let job = AnalysisJob {
            analysis_source: self.analysis_source.ok_or_else(|| corrupt("analysis_source"))?,
            job_id: self.job_id.ok_or_else(|| corrupt("job_id"))?,
            dispatched_at: self.dispatched_at.ok_or_else(|| corrupt("dispatched_at"))?,
        };

        let outcome = match (self.result, self.failure_reason) {
            (Some(result), _) => Some(AnalysisOutcome::Completed { result }),
            (None, Some(reason)) => Some(AnalysisOutcome::Failed { reason }),
            (None, None) => None,
        };

        Ok(match status {
            SubmissionStatus::Uploaded => SubmissionState::Uploaded,
            SubmissionStatus::Processing => SubmissionState::Processing { job },
            SubmissionStatus::Analyzed | SubmissionStatus::Failed => {
                let outcome = outcome.ok_or_else(|| corrupt("result or failure_reason"))?;
                let state = SubmissionState::settle(job, outcome);
                if state.status() != status {
                    return Err(corrupt("an outcome matching its status"));
                }
                state
            }
            SubmissionStatus::Reviewed => SubmissionState::Reviewed {
                job,
                outcome: outcome.ok_or_else(|| corrupt("result or failure_reason"))?,
                reviewed_by: self.reviewed_by.ok_or_else(|| corrupt("reviewed_by"))?,
                note: self.review_note,
                reviewed_at: self.reviewed_at.ok_or_else(|| corrupt("reviewed_at"))?,
            },
        })
    }
}

impl SubmissionRow {
    pub fn into_submission(self, files: Vec<FileEntry>) -> Result<Submission, AppError> {
        let kind = SubmissionKind::from_name(&self.kind).ok_or_else(|| {
            AppError::Internal(format!("submission {} has unknown kind '{}'", self.submission_id, self.kind))
        })?;

        let columns = StateColumns {
            status: self.status,
            analysis_source: self.analysis_source,
            job_id: self.job_id,
            dispatched_at: self.dispatched_at,
            result: self.result.map(|r| r.0),
            failure_reason: self.failure_reason,
            reviewed_by: self.reviewed_by,
            review_note: self.review_note,
            reviewed_at: self.reviewed_at,
        };
        let state = columns.into_state(&self.submission_id)?;

        Ok(Submission {
            id: self.submission_id,
            project_id: self.project_id,
            task_id: self.task_id,
            owner_id: self.owner_id,
            filename: self.filename,
            storage_key: self.storage_key,
            kind,
            state,
            files,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<FileRow> for FileEntry {
    fn from(row: FileRow) -> Self {
        FileEntry {
            name: row.name,
            path: row.path,
            language: Language::from_name(&row.language),
            size: row.size_bytes.max(0) as u64,
            analysis: row.analysis.map(|a| a.0),
        }
    }
}

impl TryFrom<ActivityRow> for Activity {
    type Error = AppError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let kind = ActivityKind::from_name(&row.kind).ok_or_else(|| {
            AppError::Internal(format!("activity {} has unknown kind '{}'", row.id, row.kind))
        })?;

        Ok(Activity {
            id: row.id,
            kind,
            filename: row.filename,
            submission_id: row.submission_id,
            actor: row.actor,
            detail: row.detail,
            created_at: row.created_at,
        })
    }
}
