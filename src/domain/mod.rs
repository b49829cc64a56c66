mod activity;
mod analysis;
mod status;
mod submission;

pub use activity::{Activity, ActivityKind, NewActivity};
pub use analysis::{AnalysisResult, FileAnalysis, InvalidScore, Score};
pub use status::SubmissionStatus;
pub use submission::{
    AnalysisJob, AnalysisOutcome, FileEntry, Submission, SubmissionKind, SubmissionState,
};
