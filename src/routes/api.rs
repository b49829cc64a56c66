use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Identity;
use crate::db::ActivityFilter;
use crate::domain::{Activity, AnalysisOutcome};
use crate::error::AppError;
use crate::services::{self, adhoc::CodeAnalysisRequest};
use crate::state::AppState;

const MAX_ACTIVITY_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub submission_id: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/activities
///
/// Staff read the whole trail; students only the trail of their own
/// submissions.
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, AppError> {
    if !identity.role.is_staff() {
        let id = query.submission_id.as_deref().ok_or_else(|| {
            AppError::Forbidden("students must filter activities by submissionId".to_string())
        })?;
        services::submissions::details(&state, &identity, id).await?;
    }

    let filter = ActivityFilter {
        submission_id: query.submission_id,
        limit: query.limit.map(|l| l.clamp(1, MAX_ACTIVITY_LIMIT)),
    };
    Ok(Json(state.activities.list(&filter).await?))
}

/// POST /api/analysis/code
pub async fn analyze_code(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<CodeAnalysisRequest>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    Ok(Json(
        services::adhoc::analyze_code(&state, &identity, request).await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub analysis_source: String,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        analysis_source: state.provider.source().to_string(),
    })
}
