use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Lifecycle position of a submission.
///
/// Forward path: `Uploaded → Processing → {Analyzed | Failed} → Reviewed`.
/// Re-analysis is the only move back, and it always lands on `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Uploaded,
    Processing,
    Analyzed,
    Failed,
    Reviewed,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 5] = [
        SubmissionStatus::Uploaded,
        SubmissionStatus::Processing,
        SubmissionStatus::Analyzed,
        SubmissionStatus::Failed,
        SubmissionStatus::Reviewed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Uploaded => "Uploaded",
            SubmissionStatus::Processing => "Processing",
            SubmissionStatus::Analyzed => "Analyzed",
            SubmissionStatus::Failed => "Failed",
            SubmissionStatus::Reviewed => "Reviewed",
        }
    }

    /// The provider has nothing left to say about this submission.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Analyzed | SubmissionStatus::Failed | SubmissionStatus::Reviewed
        )
    }

    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Analyzed)
                | (Processing, Failed)
                | (Analyzed, Reviewed)
                | (Failed, Reviewed)
                | (Analyzed, Processing)
                | (Failed, Processing)
                | (Reviewed, Processing)
        )
    }

    pub fn ensure_transition(self, next: SubmissionStatus) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::StateConflict(format!(
                "cannot move submission from {} to {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::Internal(format!("unknown submission status '{}'", s)))
    }
}
