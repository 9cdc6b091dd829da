//! HTTP API.
//!
//! Every handler shares one [`AppState`]. Analytics and activity logging are
//! side effects that never change a response.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::activity_log::{file_date, ActivityLog, DEFAULT_DAYS_TO_KEEP};
use crate::analytics::{recent_task_sample, Analytics, DownloadType};
use crate::export::ExportFormat;
use crate::generator::{BreakdownError, GenerationMode, GenerationStatus, Generator};
use crate::insights::{analyze_breakdown, suggest_resources, UserPreferences};
use crate::plan::{Breakdown, BreakdownForm, PlanUnit};

const RECENT_TASK_SAMPLE: usize = 10;
const RECENT_TASK_CHARS: usize = 50;
const LISTED_LOG_FILES: usize = 10;
const MAX_DAYS_TO_KEEP: i64 = 365;

pub struct AppState {
    pub generator: Generator,
    pub analytics: Analytics,
    pub activity: Arc<ActivityLog>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"success": false, "error": message.into()})))
}

fn breakdown_error(e: &BreakdownError) -> ApiError {
    let status = match e {
        BreakdownError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BreakdownError::TooLarge { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BreakdownError::Upstream(_) | BreakdownError::EmptySummary => StatusCode::BAD_GATEWAY,
        BreakdownError::Unrecoverable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        format!("Invalid request data: {}", rejection.body_text()),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/breakdown", post(create_breakdown))
        .route("/api/summary", post(summarize))
        .route("/api/insights", post(insights))
        .route("/api/export", post(export))
        .route("/api/track-download", post(track_download))
        .route("/api/track-visit", post(track_visit))
        .route("/api/analytics", get(analytics))
        .route("/api/log-info", get(log_info))
        .route("/api/log-cleanup", get(log_cleanup_info).post(cleanup_logs))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownMeta {
    pub status: GenerationStatus,
    pub mode: GenerationMode,
    pub expected_units: usize,
    pub fallback_units: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownResponse {
    #[serde(flatten)]
    pub breakdown: Breakdown,
    pub meta: BreakdownMeta,
}

async fn create_breakdown(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BreakdownForm>, JsonRejection>,
) -> Result<Json<BreakdownResponse>, ApiError> {
    let Json(form) = payload.map_err(bad_json)?;
    let goal = form.goal.trim().to_string();

    let details = serde_json::to_value(&form).unwrap_or(Value::Null);
    state.activity.user_action("generate_breakdown", &details).await;

    let outcome = match state.generator.generate(form).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Breakdown generation failed: {}", e);
            state.activity.error("generate_breakdown", &e).await;
            return Err(breakdown_error(&e));
        }
    };

    state.analytics.track_breakdown(&goal).await;
    tracing::info!(
        "Generated {} units ({:?}, {} fallback)",
        outcome.breakdown.len(),
        outcome.status,
        outcome.fallback_units
    );

    Ok(Json(BreakdownResponse {
        meta: BreakdownMeta {
            status: outcome.status,
            mode: outcome.mode,
            expected_units: outcome.expected_units,
            fallback_units: outcome.fallback_units,
        },
        breakdown: outcome.breakdown,
    }))
}

async fn summarize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Breakdown>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(breakdown) = payload.map_err(bad_json)?;
    if breakdown.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Breakdown is empty"));
    }

    match state.generator.summarize(&breakdown).await {
        Ok(summary) => Ok(Json(json!(summary))),
        Err(e) => {
            state.activity.error("summarize_breakdown", &e).await;
            Err(breakdown_error(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InsightsRequest {
    pub request: BreakdownForm,
    pub breakdown: Vec<PlanUnit>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

async fn insights(
    payload: Result<Json<InsightsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload.map_err(bad_json)?;
    let request = body
        .request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let analysis = analyze_breakdown(
        &request,
        &Breakdown::new(body.breakdown),
        body.preferences.as_ref(),
    );
    let resources = suggest_resources(request.goal());

    Ok(Json(json!({
        "success": true,
        "analysis": analysis,
        "resources": resources,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub breakdown: Vec<PlanUnit>,
}

async fn export(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(bad_json)?;
    let exporter = body.format.exporter().ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "PDF export is not rendered by the server",
        )
    })?;

    let bytes = exporter
        .render(&Breakdown::new(body.breakdown))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    state
        .analytics
        .track_download(body.format.download_type())
        .await;

    let disposition = format!(
        "attachment; filename=\"task-breakdown.{}\"",
        exporter.file_extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, exporter.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDownloadRequest {
    pub download_type: DownloadType,
}

async fn track_download(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TrackDownloadRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload.map_err(bad_json)?;
    state.analytics.track_download(body.download_type).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} download tracked successfully", body.download_type.as_str()),
    })))
}

async fn track_visit(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.analytics.track_visit().await;
    Json(json!({"success": true, "message": "Visit tracked successfully"}))
}

async fn analytics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let metrics = state.analytics.metrics().await;
    let recent_events = state.analytics.recent_events(RECENT_TASK_SAMPLE).await;

    Json(json!({
        "success": true,
        "metrics": {
            "taskBreakdownsGenerated": metrics.task_breakdowns_generated,
            "downloadsCompleted": metrics.downloads_completed,
            "visitsCount": metrics.visits_count,
            "lastUpdated": metrics.last_updated,
            "recentTasksCount": metrics.recent_tasks.len(),
            "recentTasksSample": recent_task_sample(&metrics, RECENT_TASK_SAMPLE, RECENT_TASK_CHARS),
        },
        "recentEvents": recent_events,
        "storage": state.analytics.storage_description(),
        "persistent": state.analytics.is_persistent(),
        "message": "Analytics data retrieved successfully",
    }))
}

async fn log_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let info = state.activity.info().await;
    let files = state.activity.log_files().await;
    let metrics = state.analytics.metrics().await;
    let max_file_size = info.max_file_size.clone();

    Json(json!({
        "success": true,
        "logConfiguration": info,
        "logFiles": {
            "count": files.len().min(LISTED_LOG_FILES),
            "files": files.iter().take(LISTED_LOG_FILES).collect::<Vec<_>>(),
            "totalFiles": files.len(),
        },
        "rotationInfo": {
            "rotationTriggers": [
                "Daily rotation (new file each day)",
                format!("Size-based rotation (when file exceeds {max_file_size})"),
            ],
            "maxFileSize": max_file_size,
            "fileNaming": "user_attempts_YYYY-MM-DD_HH-MM-SS-mmm.log",
        },
        "analytics": {
            "taskBreakdownsGenerated": metrics.task_breakdowns_generated,
            "downloadsCompleted": metrics.downloads_completed,
            "visitsCount": metrics.visits_count,
            "lastUpdated": metrics.last_updated,
            "recentTasksCount": metrics.recent_tasks.len(),
            "storage": state.analytics.storage_description(),
        },
    }))
}

async fn log_cleanup_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let files: Vec<Value> = state
        .activity
        .log_files()
        .await
        .into_iter()
        .map(|name| {
            let date = file_date(&name).unwrap_or("unknown").to_string();
            json!({"name": name, "date": date})
        })
        .collect();

    Json(json!({
        "success": true,
        "logFiles": {
            "count": files.len(),
            "files": files,
        },
        "cleanupInfo": {
            "message": format!("Log files older than {DEFAULT_DAYS_TO_KEEP} days can be removed with a cleanup request"),
            "manualCleanup": "POST to this endpoint with {\"daysToKeep\": N} to manually cleanup",
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub days_to_keep: Option<i64>,
}

async fn cleanup_logs(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // An empty body means "use the default".
    let body = match payload {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => CleanupRequest::default(),
        Err(e) => return Err(bad_json(e)),
    };

    let days = body.days_to_keep.unwrap_or(i64::from(DEFAULT_DAYS_TO_KEEP));
    if !(1..=MAX_DAYS_TO_KEEP).contains(&days) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("daysToKeep must be between 1 and {MAX_DAYS_TO_KEEP}"),
        ));
    }

    let deleted = state
        .activity
        .cleanup_old_logs(days as u32)
        .await
        .map_err(|e| {
            tracing::warn!("Log cleanup failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to cleanup log files: {e}"),
            )
        })?;
    let remaining = state.activity.log_files().await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Cleaned up log files older than {days} days"),
        "deletedCount": deleted,
        "remainingFiles": {
            "count": remaining.len(),
            "files": remaining.iter().take(LISTED_LOG_FILES).collect::<Vec<_>>(),
        },
    })))
}
