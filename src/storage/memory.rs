//! In-memory storage backend (no persistence)
//!
//! This backend keeps records in plain vectors behind a lock.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the relay without a database (`backend = "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Linear scans**: Listings filter and sort the whole table

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use super::query::{RecordQuery, SortOrder};
use super::schema::{
    AlertRecord, EventRecord, LogRecord, NewAlert, NewEvent, NewLog, RecordKind,
};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Int(Option<i64>),
    Text(Option<&'a str>),
}

/// Field access shared by the three record types
trait Listable: Clone {
    fn id(&self) -> i64;
    fn machine_id(&self) -> Option<&str>;
    fn timestamp(&self) -> Option<i64>;
    fn sort_key(&self, field: &str) -> SortKey<'_>;
}

impl Listable for LogRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn sort_key(&self, field: &str) -> SortKey<'_> {
        match field {
            "id" => SortKey::Int(Some(self.id)),
            "timestamp" => SortKey::Int(self.timestamp),
            "machine_id" => SortKey::Text(self.machine_id.as_deref()),
            "content" => SortKey::Text(self.content.as_deref()),
            "type" => SortKey::Text(self.kind.as_deref()),
            _ => SortKey::Text(self.log_filepath.as_deref()),
        }
    }
}

impl Listable for EventRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn sort_key(&self, field: &str) -> SortKey<'_> {
        match field {
            "id" => SortKey::Int(Some(self.id)),
            "timestamp" => SortKey::Int(self.timestamp),
            "machine_id" => SortKey::Text(self.machine_id.as_deref()),
            "type" => SortKey::Text(self.kind.as_deref()),
            _ => SortKey::Text(self.log_filepath.as_deref()),
        }
    }
}

impl Listable for AlertRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn sort_key(&self, field: &str) -> SortKey<'_> {
        match field {
            "id" => SortKey::Int(Some(self.id)),
            "timestamp" => SortKey::Int(self.timestamp),
            "machine_id" => SortKey::Text(self.machine_id.as_deref()),
            "subject" => SortKey::Text(self.subject.as_deref()),
            "reason" => SortKey::Text(self.reason.as_deref()),
            _ => SortKey::Text(self.kind.as_deref()),
        }
    }
}

/// Filter, order and page a table the same way the SQL backend does
fn select<R: Listable>(
    rows: &[R],
    kind: RecordKind,
    query: &RecordQuery,
) -> StorageResult<Vec<R>> {
    query.validate(kind)?;

    let mut matched: Vec<&R> = rows
        .iter()
        .filter(|r| query.matches(r.machine_id(), r.timestamp()))
        .collect();

    matched.sort_by(|a, b| {
        let ordering = a
            .sort_key(&query.sort_field)
            .cmp(&b.sort_key(&query.sort_field));
        match query.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
        .then_with(|| a.id().cmp(&b.id()))
    });

    let (offset, limit) = match query.limit_offset() {
        Some((limit, offset)) => (
            usize::try_from(offset).unwrap_or(usize::MAX),
            limit as usize,
        ),
        None => (0, usize::MAX),
    };

    Ok(matched.into_iter().skip(offset).take(limit).cloned().collect())
}

#[derive(Debug, Default)]
struct Tables {
    logs: Vec<LogRecord>,
    events: Vec<EventRecord>,
    alerts: Vec<AlertRecord>,
    next_id: HashMap<RecordKind, i64>,
}

impl Tables {
    fn next_id(&mut self, kind: RecordKind) -> i64 {
        let id = self.next_id.entry(kind).or_insert(1);
        let assigned = *id;
        *id += 1;
        assigned
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_by_id<R: Listable>(rows: &[R], id: i64) -> Option<R> {
    rows.iter().find(|r| r.id() == id).cloned()
}

fn retain_except<R: Listable>(rows: &mut Vec<R>, ids: &[i64]) -> u64 {
    let before = rows.len();
    rows.retain(|r| !ids.contains(&r.id()));
    (before - rows.len()) as u64
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_log(&self, log: NewLog) -> StorageResult<LogRecord> {
        let mut tables = self.tables.write().await;
        let record = log.with_id(tables.next_id(RecordKind::Log));
        tables.logs.push(record.clone());
        Ok(record)
    }

    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord> {
        let mut tables = self.tables.write().await;
        let record = event.with_id(tables.next_id(RecordKind::Event));
        tables.events.push(record.clone());
        Ok(record)
    }

    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>> {
        let mut tables = self.tables.write().await;

        let records: Vec<AlertRecord> = alerts
            .into_iter()
            .map(|alert| alert.with_id(tables.next_id(RecordKind::Alert)))
            .collect();
        tables.alerts.extend(records.iter().cloned());

        Ok(records)
    }

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogRecord>> {
        Ok(find_by_id(&self.tables.read().await.logs, id))
    }

    async fn find_event(&self, id: i64) -> StorageResult<Option<EventRecord>> {
        Ok(find_by_id(&self.tables.read().await.events, id))
    }

    async fn find_alert(&self, id: i64) -> StorageResult<Option<AlertRecord>> {
        Ok(find_by_id(&self.tables.read().await.alerts, id))
    }

    async fn find_logs(&self, query: &RecordQuery) -> StorageResult<Vec<LogRecord>> {
        debug!("querying in-memory logs");
        select(&self.tables.read().await.logs, RecordKind::Log, query)
    }

    async fn find_events(&self, query: &RecordQuery) -> StorageResult<Vec<EventRecord>> {
        debug!("querying in-memory events");
        select(&self.tables.read().await.events, RecordKind::Event, query)
    }

    async fn find_alerts(&self, query: &RecordQuery) -> StorageResult<Vec<AlertRecord>> {
        debug!("querying in-memory alerts");
        select(&self.tables.read().await.alerts, RecordKind::Alert, query)
    }

    async fn delete_by_ids(&self, kind: RecordKind, ids: &[i64]) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;

        let deleted = match kind {
            RecordKind::Log => retain_except(&mut tables.logs, ids),
            RecordKind::Event => retain_except(&mut tables.events, ids),
            RecordKind::Alert => retain_except(&mut tables.alerts, ids),
        };

        debug!("deleted {deleted} {kind} records from memory");
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("logs".to_string(), tables.logs.len().to_string()),
                ("events".to_string(), tables.events.len().to_string()),
                ("alerts".to_string(), tables.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
