//! HTTP surface tests driven through the router with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use codegrade::build_router;
use common::*;

const BOUNDARY: &str = "codegrade-test-boundary";

fn app(ctx: &TestContext) -> Router {
    build_router(ctx.state.clone())
}

async fn send(
    app: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json_body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    into_parts(app.clone().oneshot(request).await.unwrap()).await
}

async fn into_parts(response: axum::response::Response) -> (StatusCode, Option<Value>) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, json_body)
}

fn multipart_body(filename: &str, payload: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload_file(
    app: &Router,
    token: &str,
    filename: &str,
    payload: &[u8],
    fields: &[(&str, &str)],
) -> (StatusCode, Option<Value>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/submissions")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(filename, payload, fields)))
        .unwrap();

    into_parts(app.clone().oneshot(request).await.unwrap()).await
}

async fn uploaded_report(app: &Router) -> String {
    let (status, body) = upload_file(
        app,
        STUDENT_TOKEN,
        "report.zip",
        &report_zip(),
        &[("projectId", "project-1"), ("taskId", "task-1")],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body.unwrap()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_module_and_provider() {
    let ctx = test_context();
    let app = app(&ctx);

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "codegrade");
    assert_eq!(body["analysis_source"], "scripted");
}

#[tokio::test]
async fn requests_without_known_token_are_unauthorized() {
    let ctx = test_context();
    let app = app(&ctx);

    let (status, body) =
        send(&app, Method::GET, "/api/projects/p/submissions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.unwrap()["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/projects/p/submissions",
        Some("stolen-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_returns_created_submission() {
    let ctx = test_context();
    let app = app(&ctx);

    let (status, body) = upload_file(
        &app,
        STUDENT_TOKEN,
        "report.zip",
        &report_zip(),
        &[("projectId", "project-1")],
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let body = body.unwrap();
    assert_eq!(body["status"], "Uploaded");
    assert_eq!(body["kind"], "archive");
    assert_eq!(body["ownerId"], "student-1");
    assert_eq!(body["files"].as_array().unwrap().len(), 2);
    assert!(body.get("storageKey").is_none());

    let id = body["id"].as_str().unwrap();
    let (status, files) = send(
        &app,
        Method::GET,
        &format!("/api/submissions/{}/files", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = files
        .as_ref()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["src/main.py", "src/util.py"]);
}

#[tokio::test]
async fn unsupported_upload_is_a_validation_error() {
    let ctx = test_context();
    let app = app(&ctx);

    let (status, body) = upload_file(
        &app,
        STUDENT_TOKEN,
        "essay.docx",
        b"not code",
        &[("projectId", "project-1")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn upload_over_request_limit_is_payload_too_large() {
    let ctx = test_context();
    let app = app(&ctx);
    // Beyond the upload ceiling plus the multipart allowance.
    let payload = vec![b'#'; 2 * 1024 * 1024];

    let (status, body) = upload_file(
        &app,
        STUDENT_TOKEN,
        "huge.py",
        &payload,
        &[("projectId", "project-1")],
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body.unwrap()["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn analyze_then_status_reaches_analyzed() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/analyze", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body = body.unwrap();
    assert_eq!(body["status"], "Processing");
    assert_eq!(body["analysisSource"], "scripted");
    assert_eq!(body["jobId"], "job-1");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/analyze", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.unwrap()["error"]["code"], "STATE_CONFLICT");

    ctx.provider.complete_with_score(82);
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/submissions/{}/status", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "Analyzed");
    assert_eq!(body["result"]["score"], 82);
}

#[tokio::test]
async fn long_poll_times_out_with_gateway_timeout() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;
    send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/analyze", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    ctx.provider.keep_running();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/poll", id),
        Some(STUDENT_TOKEN),
        Some(json!({ "maxAttempts": 0, "intervalMs": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body.unwrap()["error"]["code"], "TIMEOUT");
    assert_eq!(ctx.provider.status_count(), 1);
}

#[tokio::test]
async fn long_poll_ignores_oversized_interval() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;
    send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/analyze", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    ctx.provider.keep_running();

    let poll_uri = format!("/api/submissions/{}/poll", id);
    let poll = send(
        &app,
        Method::POST,
        &poll_uri,
        Some(STUDENT_TOKEN),
        Some(json!({ "maxAttempts": 3, "intervalMs": 86_400_000u64 })),
    );
    let (status, _) = tokio::time::timeout(std::time::Duration::from_secs(5), poll)
        .await
        .expect("long-poll should finish on the configured interval");

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(ctx.provider.status_count(), 4);
}

#[tokio::test]
async fn review_requires_staff() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;
    send(
        &app,
        Method::POST,
        &format!("/api/submissions/{}/analyze", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    ctx.provider.complete_with_score(77);
    send(
        &app,
        Method::GET,
        &format!("/api/submissions/{}/status", id),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;

    let path = format!("/api/submissions/{}/review", id);
    let (status, _) = send(&app, Method::POST, &path, Some(STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::POST,
        &path,
        Some(TUTOR_TOKEN),
        Some(json!({ "note": "Nice work" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "Reviewed");
    assert_eq!(body["reviewedBy"], "tutor-1");
    assert_eq!(body["note"], "Nice work");
}

#[tokio::test]
async fn project_listing_filters_by_task_and_owner() {
    let ctx = test_context();
    let app = app(&ctx);
    uploaded_report(&app).await;
    upload_file(
        &app,
        STUDENT_TOKEN,
        "main.py",
        b"print('other task')",
        &[("projectId", "project-1"), ("taskId", "task-2")],
    )
    .await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/projects/project-1/submissions?taskId=task-1",
        Some(TUTOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["taskId"], "task-1");

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/projects/project-1/submissions",
        Some(OTHER_STUDENT_TOKEN),
        None,
    )
    .await;
    assert!(body.unwrap().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_submission() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;
    let path = format!("/api/submissions/{}", id);

    let (status, _) = send(&app, Method::DELETE, &path, Some(OTHER_STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::DELETE, &path, Some(STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());

    let (status, _) = send(&app, Method::GET, &path, Some(STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/activities?submissionId={}", id),
        Some(MANAGER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<String> = body
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["delete", "create"]);
}

#[tokio::test]
async fn download_returns_original_payload() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;

    let request = Request::builder()
        .uri(format!("/api/submissions/{}/download", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", STUDENT_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.to_vec(), report_zip());
}

#[tokio::test]
async fn students_read_only_their_own_activity_trail() {
    let ctx = test_context();
    let app = app(&ctx);
    let id = uploaded_report(&app).await;

    let (status, _) = send(&app, Method::GET, "/api/activities", Some(STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let path = format!("/api/activities?submissionId={}", id);
    let (status, _) = send(&app, Method::GET, &path, Some(OTHER_STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, &path, Some(STUDENT_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()[0]["type"], "create");
}

#[tokio::test]
async fn adhoc_code_analysis_endpoint() {
    let ctx = test_context();
    let app = app(&ctx);
    ctx.provider.complete_with_score(58);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/analysis/code",
        Some(STUDENT_TOKEN),
        Some(json!({ "filename": "snippet.rs", "content": "fn main() {}" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["kind"], "completed");
    assert_eq!(body["result"]["score"], 58);
}
