use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid score: {0}. score must be in [0, 100]")]
pub struct InvalidScore(pub u16);

/// Quality score in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Score(u8);

impl Score {
    pub const MIN: u16 = 0;
    pub const MAX: u16 = 100;

    pub fn new(value: u16) -> Result<Self, InvalidScore> {
        if value <= Self::MAX {
            Ok(Self(value as u8))
        } else {
            Err(InvalidScore(value))
        }
    }

    pub fn value(self) -> u16 {
        u16::from(self.0)
    }
}

impl TryFrom<u16> for Score {
    type Error = InvalidScore;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u16 {
    fn from(value: Score) -> Self {
        value.value()
    }
}

/// Outcome of one analysis run. Written once; re-analysis produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub score: Score,
    #[serde(default)]
    pub categories: BTreeMap<String, Score>,
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
    #[serde(default)]
    pub feedback: String,
    /// Which provider produced the result, e.g. `sonarqube`.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAnalysis>,
}

/// Per-file slice of an archive analysis, matched to a file entry by `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub path: String,
    pub score: Score,
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
    #[serde(default)]
    pub feedback: String,
}

impl AnalysisResult {
    pub fn file(&self, path: &str) -> Option<&FileAnalysis> {
        self.files.iter().find(|f| f.path == path)
    }
}
