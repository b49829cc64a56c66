mod memory;
mod models;

pub use memory::MemoryStore;
pub use models::*;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::domain::{Activity, FileEntry, NewActivity, Submission, SubmissionState, SubmissionStatus};
use crate::error::AppError;

/// Persistence for submissions and their file entries.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Submission>, AppError>;

    /// Newest first.
    async fn list_by_project(
        &self,
        project_id: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<Submission>, AppError>;

    /// Compare-and-set on the status column. Writes `next` only while the
    /// stored status is one of `expected`; returns whether it did.
    ///
    /// Per-file analyses are rewritten from `next`'s result, so a restart
    /// clears them.
    async fn update_state(
        &self,
        id: &str,
        expected: &[SubmissionStatus],
        next: &SubmissionState,
    ) -> Result<bool, AppError>;

    /// Removes the submission and its file entries. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub submission_id: Option<String>,
    pub limit: Option<i64>,
}

/// Append-only audit trail.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, activity: NewActivity) -> Result<Activity, AppError>;

    /// Newest first.
    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError>;
}

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 100;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// PostgreSQL backend for both [`SubmissionStore`] and [`ActivityLog`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn files_for(&self, ids: &[String]) -> Result<HashMap<String, Vec<FileEntry>>, AppError> {
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM submission_files WHERE submission_id = ANY($1) ORDER BY submission_id, position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<FileEntry>> = HashMap::new();
        for row in rows {
            map.entry(row.submission_id.clone())
                .or_default()
                .push(FileEntry::from(row));
        }
        Ok(map)
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn insert(&self, submission: &Submission) -> Result<(), AppError> {
        let columns = StateColumns::from(&submission.state);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO submissions (
                submission_id, project_id, task_id, owner_id, filename, storage_key, kind,
                status, analysis_source, job_id, dispatched_at, result, failure_reason,
                reviewed_by, review_note, reviewed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&submission.id)
        .bind(&submission.project_id)
        .bind(&submission.task_id)
        .bind(&submission.owner_id)
        .bind(&submission.filename)
        .bind(&submission.storage_key)
        .bind(submission.kind.as_str())
        .bind(&columns.status)
        .bind(&columns.analysis_source)
        .bind(&columns.job_id)
        .bind(columns.dispatched_at)
        .bind(columns.result.clone().map(Json))
        .bind(&columns.failure_reason)
        .bind(&columns.reviewed_by)
        .bind(&columns.review_note)
        .bind(columns.reviewed_at)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, file) in submission.files.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO submission_files (submission_id, position, name, path, language, size_bytes, analysis)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&submission.id)
            .bind(position as i32)
            .bind(&file.name)
            .bind(&file.path)
            .bind(file.language.as_str())
            .bind(file.size as i64)
            .bind(file.analysis.clone().map(Json))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Submission>, AppError> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE submission_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut files = self.files_for(&[id.to_string()]).await?;
        let files = files.remove(id).unwrap_or_default();
        row.into_submission(files).map(Some)
    }

    async fn list_by_project(
        &self,
        project_id: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<Submission>, AppError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT * FROM submissions
            WHERE project_id = $1 AND ($2::TEXT IS NULL OR task_id = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(project_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.submission_id.clone()).collect();
        let mut files = self.files_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let entries = files.remove(&row.submission_id).unwrap_or_default();
                row.into_submission(entries)
            })
            .collect()
    }

    async fn update_state(
        &self,
        id: &str,
        expected: &[SubmissionStatus],
        next: &SubmissionState,
    ) -> Result<bool, AppError> {
        let columns = StateColumns::from(next);
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE submissions
            SET status = $3, analysis_source = $4, job_id = $5, dispatched_at = $6,
                result = $7, failure_reason = $8, reviewed_by = $9, review_note = $10,
                reviewed_at = $11, updated_at = NOW()
            WHERE submission_id = $1 AND status = ANY($2)
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(&columns.status)
        .bind(&columns.analysis_source)
        .bind(&columns.job_id)
        .bind(columns.dispatched_at)
        .bind(columns.result.clone().map(Json))
        .bind(&columns.failure_reason)
        .bind(&columns.reviewed_by)
        .bind(&columns.review_note)
        .bind(columns.reviewed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE submission_files SET analysis = NULL WHERE submission_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(result) = next.result() {
            for file in &result.files {
                sqlx::query(
                    "UPDATE submission_files SET analysis = $3 WHERE submission_id = $1 AND path = $2",
                )
                .bind(id)
                .bind(&file.path)
                .bind(Json(file.clone()))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM submissions WHERE submission_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}

#[async_trait]
impl ActivityLog for PgStore {
    async fn append(&self, activity: NewActivity) -> Result<Activity, AppError> {
        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            INSERT INTO activities (kind, filename, submission_id, actor, detail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(activity.kind.as_str())
        .bind(&activity.filename)
        .bind(&activity.submission_id)
        .bind(&activity.actor)
        .bind(&activity.detail)
        .fetch_one(&self.pool)
        .await?;

        Activity::try_from(row)
    }

    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT * FROM activities
            WHERE ($1::TEXT IS NULL OR submission_id = $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(&filter.submission_id)
        .bind(filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Activity::try_from).collect()
    }
}
