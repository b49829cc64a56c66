use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum::extract::multipart::MultipartError;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Identity;
use crate::domain::{FileEntry, Submission};
use crate::error::AppError;
use crate::services::{self, dispatcher, poller, review, submissions, upload::UploadRequest};
use crate::state::AppState;
use crate::storage::sanitize_filename;

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("upload exceeds the request size limit".to_string())
    } else {
        AppError::Validation(format!("malformed upload: {}", e.body_text()))
    }
}

/// POST /api/submissions
///
/// Multipart fields: `file` (payload), `projectId`, optional `taskId` and
/// `userId`.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let mut payload: Option<Vec<u8>> = None;
    let mut filename = String::new();
    let mut project_id = String::new();
    let mut task_id: Option<String> = None;
    let mut owner_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().unwrap_or("").to_string();
                payload = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            "projectId" | "project_id" => {
                project_id = field.text().await.map_err(multipart_error)?;
            }
            "taskId" | "task_id" => {
                task_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "userId" | "user_id" => {
                owner_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let payload =
        payload.ok_or_else(|| AppError::Validation("multipart field 'file' is missing".to_string()))?;

    let submission = services::upload::upload(
        &state,
        &identity,
        UploadRequest {
            filename,
            payload,
            project_id,
            task_id,
            owner_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// GET /api/submissions/:id
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Submission>, AppError> {
    Ok(Json(submissions::details(&state, &identity, &id).await?))
}

/// GET /api/submissions/:id/files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileEntry>>, AppError> {
    let submission = submissions::details(&state, &identity, &id).await?;
    Ok(Json(submission.files))
}

/// GET /api/submissions/:id/download
pub async fn download_payload(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (submission, bytes) = submissions::payload(&state, &identity, &id).await?;

    let mime = mime_guess::from_path(&submission.filename)
        .first_raw()
        .unwrap_or("application/octet-stream");
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&submission.filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/submissions/:id/analyze
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = dispatcher::dispatch(&state, &identity, &id).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// POST /api/submissions/:id/reanalyze
pub async fn reanalyze(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = dispatcher::reanalyze(&state, &identity, &id).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// GET /api/submissions/:id/status
///
/// One observation; finished submissions are answered from the store.
pub async fn check_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Submission>, AppError> {
    submissions::details(&state, &identity, &id).await?;
    Ok(Json(poller::poll_once(&state, &id, &identity.id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub max_attempts: Option<u32>,
    pub interval_ms: Option<u64>,
}

/// POST /api/submissions/:id/poll
///
/// Bounded long-poll. Requested attempts and interval are clamped to the
/// configured schedule.
pub async fn long_poll(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    body: Option<Json<PollRequest>>,
) -> Result<Json<Submission>, AppError> {
    submissions::details(&state, &identity, &id).await?;

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let schedule = state.poll_schedule().narrowed(
        request.max_attempts,
        request.interval_ms.map(std::time::Duration::from_millis),
    );

    Ok(Json(
        poller::poll_until_settled(&state, &id, schedule, &identity.id).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub note: Option<String>,
}

/// POST /api/submissions/:id/review
pub async fn review_submission(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Submission>, AppError> {
    let note = body.and_then(|Json(r)| r.note);
    Ok(Json(review::review(&state, &identity, &id, note).await?))
}

/// DELETE /api/submissions/:id
pub async fn delete_submission(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    submissions::delete(&state, &identity, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub task_id: Option<String>,
}

/// GET /api/projects/:project_id/submissions
pub async fn list_by_project(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(project_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Submission>>, AppError> {
    let task_id = query.task_id.as_deref().filter(|t| !t.is_empty());
    Ok(Json(
        submissions::list_by_project(&state, &identity, &project_id, task_id).await?,
    ))
}
