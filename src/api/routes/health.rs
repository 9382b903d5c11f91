//! Health check endpoints

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{ApiResponse, HealthResponse, RelayHealth, StorageHealth},
};

/// GET /
///
/// Liveness probe kept for existing dashboards
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Hurrah! API is running." }))
}

/// GET /api/health
///
/// Reports relay counters and storage health
pub async fn health_check(
    State(state): State<ApiState>,
) -> ApiResult<Json<ApiResponse<HealthResponse>>> {
    let storage = state.storage.health_check().await?;

    let health = HealthResponse {
        status: if storage.healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        relay: RelayHealth {
            sessions: state.registry().len().await,
            viewers: state.dispatcher.viewer_count(),
            stats: state.dispatcher.stats(),
        },
        storage: StorageHealth {
            healthy: storage.healthy,
            message: storage.message,
            metadata: storage.metadata,
        },
    };

    Ok(Json(ApiResponse::success("Health fetched successfully!", health)))
}
