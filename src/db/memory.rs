use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ActivityFilter, ActivityLog, SubmissionStore, DEFAULT_ACTIVITY_LIMIT};
use crate::domain::{Activity, NewActivity, Submission, SubmissionState, SubmissionStatus};
use crate::error::AppError;

#[derive(Default)]
struct Inner {
    /// Insertion sequence keeps newest-first ordering stable when
    /// timestamps collide.
    submissions: HashMap<String, (u64, Submission)>,
    next_seq: u64,
    activities: Vec<Activity>,
}

/// Process-local backend used by `STORE_BACKEND=memory` and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert(&self, submission: &Submission) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.submissions.contains_key(&submission.id) {
            return Err(AppError::StateConflict(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .submissions
            .insert(submission.id.clone(), (seq, submission.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Submission>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.submissions.get(id).map(|(_, s)| s.clone()))
    }

    async fn list_by_project(
        &self,
        project_id: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<Submission>, AppError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&(u64, Submission)> = inner
            .submissions
            .values()
            .filter(|(_, s)| s.project_id == project_id)
            .filter(|(_, s)| task_id.map_or(true, |t| s.task_id.as_deref() == Some(t)))
            .collect();

        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        Ok(matching.into_iter().map(|(_, s)| s.clone()).collect())
    }

    async fn update_state(
        &self,
        id: &str,
        expected: &[SubmissionStatus],
        next: &SubmissionState,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let Some((_, submission)) = inner.submissions.get_mut(id) else {
            return Ok(false);
        };

        if !expected.contains(&submission.status()) {
            return Ok(false);
        }

        submission.state = next.clone();
        submission.updated_at = Utc::now();
        Submission::attach_file_results(&mut submission.files, next.result());
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.submissions.remove(id).is_some())
    }
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn append(&self, activity: NewActivity) -> Result<Activity, AppError> {
        let mut inner = self.inner.write().await;
        let entry = Activity {
            id: inner.activities.len() as i64 + 1,
            kind: activity.kind,
            filename: activity.filename,
            submission_id: activity.submission_id,
            actor: activity.actor,
            detail: activity.detail,
            created_at: Utc::now(),
        };
        inner.activities.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        let inner = self.inner.read().await;
        let limit = filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).max(0) as usize;

        Ok(inner
            .activities
            .iter()
            .rev()
            .filter(|a| {
                filter
                    .submission_id
                    .as_ref()
                    .map_or(true, |id| a.submission_id.as_ref() == Some(id))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
