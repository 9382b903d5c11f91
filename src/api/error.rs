//! API error types and conversions
//!
//! Errors render as the same envelope as successful responses, with
//! `status: "error"` and no `data`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::storage::error::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Storage operation failed
    StorageError(String),

    /// Invalid request body or parameters
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Internal server error
    Internal(String),
}

impl ApiError {
    /// Wrap a storage failure with what the handler was doing
    ///
    /// Rejected query parameters stay client errors.
    pub fn storage(context: impl std::fmt::Display, err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::StorageError(format!("{context}. {other}")),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::StorageError(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::StorageError(msg) | ApiError::Internal(msg) => {
                write!(f, "Something went wrong. {msg}")
            }
            ApiError::InvalidRequest(msg) | ApiError::NotFound(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::StorageError(other.to_string()),
        }
    }
}
