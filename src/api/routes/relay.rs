//! Read-only inspection of live relay sessions

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ApiResponse,
};
use crate::relay::{SessionSummary, WindowUpdate};

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
    pub path: Option<String>,
}

/// GET /api/relay/sessions
pub async fn list_sessions(
    State(state): State<ApiState>,
) -> Json<ApiResponse<Vec<SessionSummary>>> {
    let sessions = state.registry().list().await;
    Json(ApiResponse::success("Sessions fetched successfully!", sessions))
}

/// GET /api/relay/sessions/{machine_id}
///
/// The current window, shaped like a `receive_logs` payload
pub async fn get_session(
    State(state): State<ApiState>,
    Path(machine_id): Path<String>,
) -> ApiResult<Json<ApiResponse<WindowUpdate>>> {
    let session = state
        .registry()
        .get(&machine_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No session found for '{machine_id}'!")))?;

    let window = WindowUpdate {
        machine_id,
        logs: session.snapshot().await,
    };

    Ok(Json(ApiResponse::success(
        "Session fetched successfully!",
        window,
    )))
}

/// GET /api/relay/sessions/{machine_id}/series?path=a.b
///
/// `[timestamp, value]` pairs for one payload path across the window
pub async fn get_series(
    State(state): State<ApiState>,
    Path(machine_id): Path<String>,
    Query(params): Query<SeriesParams>,
) -> ApiResult<Json<ApiResponse<Vec<(i64, Value)>>>> {
    let path = params
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Expected a 'path' query parameter.".to_string()))?;

    let session = state
        .registry()
        .get(&machine_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No session found for '{machine_id}'!")))?;

    let points = session
        .series(&path)
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Cannot read '{path}': {e}")))?;

    Ok(Json(ApiResponse::success(
        "Series fetched successfully!",
        points,
    )))
}
