//! Response bodies shared by the REST handlers
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! {"status": "success", "message": "Logs fetched successfully!", "data": [...]}
//! ```
//!
//! `data` is omitted when there is nothing to return.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::relay::RelayStats;

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: None,
        }
    }
}

/// `data` of a remove request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub requested: usize,
    pub deleted: u64,
}

/// Response for GET /api/health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub relay: RelayHealth,
    pub storage: StorageHealth,
}

/// Relay section of the health report
#[derive(Debug, Clone, Serialize)]
pub struct RelayHealth {
    pub sessions: usize,
    pub viewers: usize,
    #[serde(flatten)]
    pub stats: RelayStats,
}

/// Storage section of the health report
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
    pub metadata: HashMap<String, String>,
}
