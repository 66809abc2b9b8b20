use super::state::AppState;
use crate::error::ModerationError;
use crate::session::SessionStats;
use crate::voice::{ChannelId, GroupId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartMonitoringRequest {
    /// Voice channel to join
    pub channel_id: ChannelId,
}

#[derive(Debug, Serialize)]
pub struct MonitoringResponse {
    pub group_id: GroupId,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Deserialize)]
pub struct SetThresholdRequest {
    /// Any JSON number; non-integers are rejected as out of range
    pub value: serde_json::Number,
}

#[derive(Debug, Serialize)]
pub struct ThresholdResponse {
    pub group_id: GroupId,
    pub decibel_threshold: u8,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: ModerationError) -> Response {
    let status = match &err {
        ModerationError::AlreadyMonitoring(_) => StatusCode::CONFLICT,
        ModerationError::NotMonitoring(_) => StatusCode::NOT_FOUND,
        ModerationError::InvalidRange(_) => StatusCode::BAD_REQUEST,
        ModerationError::Gateway(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /groups/:group_id/monitoring
/// Join a voice channel and start monitoring the group
pub async fn start_monitoring(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Json(req): Json<StartMonitoringRequest>,
) -> Response {
    info!("Starting monitoring for group {} in {}", group_id, req.channel_id);

    match state.sessions.start(&group_id, &req.channel_id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(MonitoringResponse {
                group_id: group_id.clone(),
                status: "monitoring".to_string(),
                message: format!("Monitoring started in {}", req.channel_id),
                stats,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /groups/:group_id/monitoring
/// Stop monitoring and leave the voice channel
pub async fn stop_monitoring(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
) -> Response {
    info!("Stopping monitoring for group {}", group_id);

    match state.sessions.stop(&group_id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(MonitoringResponse {
                group_id: group_id.clone(),
                status: "stopped".to_string(),
                message: "Disconnected from the voice channel".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /groups/:group_id/monitoring
/// Status of the group's monitoring session
pub async fn get_monitoring_status(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
) -> Response {
    match state.sessions.status(&group_id).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /groups/:group_id/threshold
pub async fn get_threshold(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
) -> Response {
    let threshold = state.thresholds.get(&group_id);
    (
        StatusCode::OK,
        Json(ThresholdResponse {
            group_id,
            decibel_threshold: threshold.value(),
        }),
    )
        .into_response()
}

/// PUT /groups/:group_id/threshold
/// Set the group's decibel threshold (0..=150)
pub async fn set_threshold(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Json(req): Json<SetThresholdRequest>,
) -> Response {
    let result = match req.value.as_i64() {
        Some(value) => state.thresholds.set(&group_id, value).await,
        None => Err(ModerationError::InvalidRange(req.value.to_string())),
    };

    match result {
        Ok(threshold) => (
            StatusCode::OK,
            Json(ThresholdResponse {
                group_id,
                decibel_threshold: threshold.value(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
