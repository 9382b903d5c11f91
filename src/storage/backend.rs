//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! record stores must implement.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::query::RecordQuery;
use super::schema::{
    AlertRecord, EventRecord, LogRecord, NewAlert, NewEvent, NewLog, RecordKind,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for record stores (logs, events, alerts)
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the REST handlers share one
/// instance as `Arc<dyn StorageBackend>`.
///
/// ## Queries
///
/// `find_*` listings reject a [`RecordQuery`] that fails
/// [`RecordQuery::validate`] for the matching [`RecordKind`], then apply the
/// filters, the ordering and the `(limit, offset)` page.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store one log line and return it with its assigned id
    async fn insert_log(&self, log: NewLog) -> StorageResult<LogRecord>;

    /// Store one event and return it with its assigned id
    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord>;

    /// Store alerts atomically; either all are stored or none
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>>;

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogRecord>>;

    async fn find_event(&self, id: i64) -> StorageResult<Option<EventRecord>>;

    async fn find_alert(&self, id: i64) -> StorageResult<Option<AlertRecord>>;

    async fn find_logs(&self, query: &RecordQuery) -> StorageResult<Vec<LogRecord>>;

    async fn find_events(&self, query: &RecordQuery) -> StorageResult<Vec<EventRecord>>;

    async fn find_alerts(&self, query: &RecordQuery) -> StorageResult<Vec<AlertRecord>>;

    /// Delete records of `kind` by id, returning how many existed
    ///
    /// Unknown ids are ignored.
    async fn delete_by_ids(&self, kind: RecordKind, ids: &[i64]) -> StorageResult<u64>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
