use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Create,
    Update,
    Delete,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Create => "create",
            ActivityKind::Update => "update",
            ActivityKind::Delete => "delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(ActivityKind::Create),
            "update" => Some(ActivityKind::Update),
            "delete" => Some(ActivityKind::Delete),
            _ => None,
        }
    }
}

/// Audit entry. Never edited or removed once appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub filename: String,
    pub submission_id: Option<String>,
    pub actor: String,
    pub detail: Option<String>,
}

impl NewActivity {
    pub fn new(kind: ActivityKind, filename: &str, submission_id: &str, actor: &str) -> Self {
        Self {
            kind,
            filename: filename.to_string(),
            submission_id: Some(submission_id.to_string()),
            actor: actor.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
