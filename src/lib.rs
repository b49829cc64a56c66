//! Submission upload, code-quality analysis and review service.
//!
//! A submission moves `Uploaded → Processing → {Analyzed | Failed} →
//! Reviewed`; every move is recorded in an append-only activity log.

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod files;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

pub use error::AppError;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{HttpIdentityResolver, IdentityResolver, StaticIdentityResolver};
use crate::config::{Config, StoreBackend};
use crate::db::{ActivityLog, MemoryStore, PgStore, SubmissionStore};
use crate::provider::HttpAnalysisProvider;
use crate::storage::LocalStorage;

/// Room for multipart framing and the sibling text fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(routes::health_check))
        .route(
            "/api/submissions",
            post(routes::upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/submissions/:id",
            get(routes::get_submission).delete(routes::delete_submission),
        )
        .route("/api/submissions/:id/files", get(routes::list_files))
        .route("/api/submissions/:id/download", get(routes::download_payload))
        .route("/api/submissions/:id/analyze", post(routes::analyze))
        .route("/api/submissions/:id/reanalyze", post(routes::reanalyze))
        .route("/api/submissions/:id/status", get(routes::check_status))
        .route("/api/submissions/:id/poll", post(routes::long_poll))
        .route("/api/submissions/:id/review", post(routes::review_submission))
        .route(
            "/api/projects/:project_id/submissions",
            get(routes::list_by_project),
        )
        .route("/api/activities", get(routes::list_activities))
        .route(
            "/api/analysis/code",
            post(routes::analyze_code).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wires the configured backends together.
pub async fn build_state(
    config: Config,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let storage = LocalStorage::new(config.upload_folder.clone());
    storage.ensure_dir()?;

    let (store, activities): (Arc<dyn SubmissionStore>, Arc<dyn ActivityLog>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let pool = db::create_pool(&config.database_url).await?;
                db::run_migrations(&pool).await?;
                let store = Arc::new(PgStore::new(pool));
                let activities: Arc<dyn ActivityLog> = store.clone();
                (store as Arc<dyn SubmissionStore>, activities)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; submissions are lost on restart");
                let store = Arc::new(MemoryStore::new());
                let activities: Arc<dyn ActivityLog> = store.clone();
                (store as Arc<dyn SubmissionStore>, activities)
            }
        };

    let identity: Arc<dyn IdentityResolver> = match (&config.auth_url, &config.static_tokens) {
        (Some(url), _) => Arc::new(HttpIdentityResolver::new(url)?),
        (None, Some(tokens)) => Arc::new(StaticIdentityResolver::parse(tokens)?),
        (None, None) => return Err("either AUTH_URL or STATIC_TOKENS must be set".into()),
    };

    let provider = HttpAnalysisProvider::new(
        &config.analysis_api_url,
        config.analysis_api_token.clone(),
        &config.analysis_source,
    )?;

    Ok(AppState {
        store,
        activities,
        provider: Arc::new(provider),
        identity,
        storage,
        config: Arc::new(config),
        startup_time: Utc::now(),
    })
}
