use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::{AnalysisResult, FileAnalysis};
use super::status::SubmissionStatus;
use crate::files::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    File,
    Archive,
}

impl SubmissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionKind::File => "file",
            SubmissionKind::Archive => "archive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "file" => Some(SubmissionKind::File),
            "archive" => Some(SubmissionKind::Archive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the archive root, or the filename for single files.
    pub path: String,
    pub language: Language,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<FileAnalysis>,
}

/// Provenance of a provider job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub analysis_source: String,
    pub job_id: String,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisOutcome {
    Completed { result: AnalysisResult },
    Failed { reason: String },
}

/// Everything that depends on where the submission is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SubmissionState {
    Uploaded,
    Processing {
        #[serde(flatten)]
        job: AnalysisJob,
    },
    Analyzed {
        #[serde(flatten)]
        job: AnalysisJob,
        result: AnalysisResult,
    },
    Failed {
        #[serde(flatten)]
        job: AnalysisJob,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Reviewed {
        #[serde(flatten)]
        job: AnalysisJob,
        outcome: AnalysisOutcome,
        reviewed_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        reviewed_at: DateTime<Utc>,
    },
}

impl SubmissionState {
    pub fn status(&self) -> SubmissionStatus {
        match self {
            SubmissionState::Uploaded => SubmissionStatus::Uploaded,
            SubmissionState::Processing { .. } => SubmissionStatus::Processing,
            SubmissionState::Analyzed { .. } => SubmissionStatus::Analyzed,
            SubmissionState::Failed { .. } => SubmissionStatus::Failed,
            SubmissionState::Reviewed { .. } => SubmissionStatus::Reviewed,
        }
    }

    pub fn job(&self) -> Option<&AnalysisJob> {
        match self {
            SubmissionState::Uploaded => None,
            SubmissionState::Processing { job }
            | SubmissionState::Analyzed { job, .. }
            | SubmissionState::Failed { job, .. }
            | SubmissionState::Reviewed { job, .. } => Some(job),
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            SubmissionState::Analyzed { result, .. }
            | SubmissionState::Reviewed {
                outcome: AnalysisOutcome::Completed { result },
                ..
            } => Some(result),
            _ => None,
        }
    }

    /// Terminal state reached from `Processing` once the provider answers.
    pub fn settle(job: AnalysisJob, outcome: AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::Completed { result } => SubmissionState::Analyzed { job, result },
            AnalysisOutcome::Failed { reason } => SubmissionState::Failed { job, reason },
        }
    }

    /// The analysis outcome of a settled state, if any.
    pub fn outcome(&self) -> Option<AnalysisOutcome> {
        match self {
            SubmissionState::Analyzed { result, .. } => Some(AnalysisOutcome::Completed {
                result: result.clone(),
            }),
            SubmissionState::Failed { reason, .. } => Some(AnalysisOutcome::Failed {
                reason: reason.clone(),
            }),
            SubmissionState::Reviewed { outcome, .. } => Some(outcome.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub owner_id: String,
    pub filename: String,
    /// Name of the stored payload inside the upload folder.
    #[serde(skip)]
    pub storage_key: String,
    pub kind: SubmissionKind,
    #[serde(flatten)]
    pub state: SubmissionState,
    pub files: Vec<FileEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn status(&self) -> SubmissionStatus {
        self.state.status()
    }

    /// Copies per-file slices of `result` onto the matching entries.
    pub fn attach_file_results(files: &mut [FileEntry], result: Option<&AnalysisResult>) {
        for entry in files.iter_mut() {
            entry.analysis = result.and_then(|r| r.file(&entry.path)).cloned();
        }
    }
}
