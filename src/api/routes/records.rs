//! Log, event and alert endpoints
//!
//! Each record kind exposes the same three routes:
//!
//! - `POST /api/{kind}/add` - store one record (alerts: an array of records)
//! - `GET /api/{kind}/get` - one record by `?id=`, or a filtered listing
//! - `DELETE /api/{kind}/remove` - delete by a JSON array of ids

use std::str::FromStr;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ApiResponse, DeleteSummary},
};
use crate::storage::{
    AlertRecord, EventRecord, LogRecord, NewAlert, NewEvent, NewLog, RecordKind, RecordQuery,
    SortOrder, StorageBackend, StorageResult,
};

const NO_DATA: &str = "Didn't receive any data.";
const NOT_AN_ARRAY: &str = "Expected data to be an 'Array', got something else.";

/// Query parameters of `GET /api/{kind}/get`
///
/// Everything arrives as text; an empty value counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub id: Option<String>,
    pub machine_id: Option<String>,
    pub min_timestamp: Option<String>,
    pub max_timestamp: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_param<T: FromStr>(name: &str, value: &Option<String>) -> ApiResult<Option<T>> {
    present(value)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                ApiError::InvalidRequest(format!("Invalid value '{raw}' for '{name}'."))
            })
        })
        .transpose()
}

impl ListParams {
    pub fn id(&self) -> ApiResult<Option<i64>> {
        parse_param("id", &self.id)
    }

    /// Build a listing query with the defaults filled in
    pub fn to_query(&self) -> ApiResult<RecordQuery> {
        let defaults = RecordQuery::default();

        let sort_order = match present(&self.sort_order) {
            Some(raw) => raw.parse::<SortOrder>()?,
            None => defaults.sort_order,
        };

        Ok(RecordQuery {
            machine_id: present(&self.machine_id).map(str::to_string),
            min_timestamp: parse_param("min_timestamp", &self.min_timestamp)?,
            max_timestamp: parse_param("max_timestamp", &self.max_timestamp)?,
            sort_field: present(&self.sort_field)
                .map(str::to_string)
                .unwrap_or(defaults.sort_field),
            sort_order,
            page: parse_param("page", &self.page)?.unwrap_or(defaults.page),
            size: parse_param("size", &self.size)?.unwrap_or(defaults.size),
        })
    }
}

/// Per-kind storage access used by the generic handlers
#[async_trait]
trait Resource: Serialize + Send + Sized + 'static {
    const KIND: RecordKind;

    async fn find(storage: &dyn StorageBackend, id: i64) -> StorageResult<Option<Self>>;

    async fn list(storage: &dyn StorageBackend, query: &RecordQuery) -> StorageResult<Vec<Self>>;
}

#[async_trait]
impl Resource for LogRecord {
    const KIND: RecordKind = RecordKind::Log;

    async fn find(storage: &dyn StorageBackend, id: i64) -> StorageResult<Option<Self>> {
        storage.find_log(id).await
    }

    async fn list(storage: &dyn StorageBackend, query: &RecordQuery) -> StorageResult<Vec<Self>> {
        storage.find_logs(query).await
    }
}

#[async_trait]
impl Resource for EventRecord {
    const KIND: RecordKind = RecordKind::Event;

    async fn find(storage: &dyn StorageBackend, id: i64) -> StorageResult<Option<Self>> {
        storage.find_event(id).await
    }

    async fn list(storage: &dyn StorageBackend, query: &RecordQuery) -> StorageResult<Vec<Self>> {
        storage.find_events(query).await
    }
}

#[async_trait]
impl Resource for AlertRecord {
    const KIND: RecordKind = RecordKind::Alert;

    async fn find(storage: &dyn StorageBackend, id: i64) -> StorageResult<Option<Self>> {
        storage.find_alert(id).await
    }

    async fn list(storage: &dyn StorageBackend, query: &RecordQuery) -> StorageResult<Vec<Self>> {
        storage.find_alerts(query).await
    }
}

/// The request body, or the "no data" error for a missing or empty one
fn require_body(body: Option<Json<Value>>) -> ApiResult<Value> {
    match body {
        None | Some(Json(Value::Null)) => Err(ApiError::InvalidRequest(NO_DATA.to_string())),
        Some(Json(Value::String(s))) if s.is_empty() => {
            Err(ApiError::InvalidRequest(NO_DATA.to_string()))
        }
        Some(Json(Value::Array(items))) if items.is_empty() => {
            Err(ApiError::InvalidRequest(NO_DATA.to_string()))
        }
        Some(Json(value)) => Ok(value),
    }
}

fn require_array(body: Option<Json<Value>>) -> ApiResult<Vec<Value>> {
    match require_body(body)? {
        Value::Array(items) => Ok(items),
        _ => Err(ApiError::InvalidRequest(NOT_AN_ARRAY.to_string())),
    }
}

fn decode<T: DeserializeOwned>(kind: RecordKind, value: Value) -> ApiResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid {kind} record: {e}")))
}

fn record_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn get_records<R: Resource>(
    state: &ApiState,
    params: &ListParams,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let (singular, plural) = R::KIND.nouns();
    let storage = state.storage.as_ref();

    if let Some(id) = params.id()? {
        let record = R::find(storage, id)
            .await
            .map_err(|e| ApiError::storage(format!("Error while fetching {}", R::KIND), e))?
            .ok_or_else(|| ApiError::NotFound(format!("No {} found!", R::KIND)))?;

        return Ok(Json(ApiResponse::success(
            format!("{singular} fetched successfully!"),
            serde_json::to_value(record).map_err(|e| ApiError::Internal(e.to_string()))?,
        )));
    }

    let query = params.to_query()?;
    let records = R::list(storage, &query)
        .await
        .map_err(|e| ApiError::storage(format!("Error while fetching {}s", R::KIND), e))?;

    debug!("listed {} {} records", records.len(), R::KIND);

    Ok(Json(ApiResponse::success(
        format!("{plural} fetched successfully!"),
        serde_json::to_value(records).map_err(|e| ApiError::Internal(e.to_string()))?,
    )))
}

async fn remove_records(
    state: &ApiState,
    kind: RecordKind,
    body: Option<Json<Value>>,
) -> ApiResult<Json<ApiResponse<DeleteSummary>>> {
    let items = require_array(body)?;
    let ids = items
        .iter()
        .map(|item| {
            record_id(item).ok_or_else(|| {
                ApiError::InvalidRequest(format!("Expected record ids, got '{item}'."))
            })
        })
        .collect::<ApiResult<Vec<i64>>>()?;

    let deleted = state
        .storage
        .delete_by_ids(kind, &ids)
        .await
        .map_err(|e| ApiError::storage(format!("Error while removing {kind}s"), e))?;

    Ok(Json(ApiResponse::success(
        format!("{} removed successfully!", kind.nouns().1),
        DeleteSummary {
            requested: ids.len(),
            deleted,
        },
    )))
}

/// POST /api/log/add
pub async fn add_log(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LogRecord>>)> {
    let log: NewLog = decode(RecordKind::Log, require_body(body)?)?;

    let record = state
        .storage
        .insert_log(log)
        .await
        .map_err(|e| ApiError::storage("Error while saving log", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Log saved successfully!", record)),
    ))
}

/// GET /api/log/get
pub async fn get_logs(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    get_records::<LogRecord>(&state, &params).await
}

/// DELETE /api/log/remove
pub async fn remove_logs(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<ApiResponse<DeleteSummary>>> {
    remove_records(&state, RecordKind::Log, body).await
}

/// POST /api/event/add
///
/// Accepts the structured part as either `data` or `props`.
pub async fn add_event(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<(StatusCode, Json<ApiResponse<EventRecord>>)> {
    let event: NewEvent = decode(RecordKind::Event, require_body(body)?)?;

    let record = state
        .storage
        .insert_event(event)
        .await
        .map_err(|e| ApiError::storage("Error while saving event", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Event saved successfully!", record)),
    ))
}

/// GET /api/event/get
pub async fn get_events(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    get_records::<EventRecord>(&state, &params).await
}

/// DELETE /api/event/remove
pub async fn remove_events(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<ApiResponse<DeleteSummary>>> {
    remove_records(&state, RecordKind::Event, body).await
}

/// POST /api/alert/add
///
/// The body is an array; all alerts are stored or none are.
pub async fn add_alerts(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vec<AlertRecord>>>)> {
    let alerts = require_array(body)?
        .into_iter()
        .map(|item| decode::<NewAlert>(RecordKind::Alert, item))
        .collect::<ApiResult<Vec<_>>>()?;

    let records = state
        .storage
        .insert_alerts(alerts)
        .await
        .map_err(|e| ApiError::storage("Error while saving alerts", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Alerts saved successfully!", records)),
    ))
}

/// GET /api/alert/get
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    get_records::<AlertRecord>(&state, &params).await
}

/// DELETE /api/alert/remove
pub async fn remove_alerts(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<ApiResponse<DeleteSummary>>> {
    remove_records(&state, RecordKind::Alert, body).await
}
