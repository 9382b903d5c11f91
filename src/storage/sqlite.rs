//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Event `data` is stored as JSON text and parsed back on read.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::query::RecordQuery;
use super::schema::{
    AlertRecord, EventRecord, LogRecord, NewAlert, NewEvent, NewLog, RecordKind,
};

const LOG_COLUMNS: &str = "id, machine_id, content, type, timestamp, log_filepath";
const EVENT_COLUMNS: &str = "id, machine_id, type, timestamp, data, log_filepath";
const ALERT_COLUMNS: &str = "id, machine_id, subject, reason, type, timestamp";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode with normal sync
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use attestation_server::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./attestation.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Build `SELECT ... WHERE ... ORDER BY ... LIMIT ... OFFSET ...` for a validated query
    fn select_query<'q>(
        kind: RecordKind,
        columns: &str,
        query: &'q RecordQuery,
    ) -> QueryBuilder<'q, Sqlite> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {columns} FROM {} WHERE 1 = 1",
            kind.table()
        ));

        if let Some(machine_id) = &query.machine_id {
            builder.push(" AND machine_id = ").push_bind(machine_id);
        }
        if let Some(min) = query.min_timestamp {
            builder.push(" AND timestamp >= ").push_bind(min);
        }
        if let Some(max) = query.max_timestamp {
            builder.push(" AND timestamp <= ").push_bind(max);
        }

        // sort_field was checked against the column whitelist by validate()
        builder.push(format!(
            " ORDER BY \"{}\" {}, id ASC",
            query.sort_field,
            query.sort_order.as_sql()
        ));

        if let Some((limit, offset)) = query.limit_offset() {
            builder
                .push(" LIMIT ")
                .push_bind(i64::from(limit))
                .push(" OFFSET ")
                .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        builder
    }

    fn log_from_row(row: &SqliteRow) -> StorageResult<LogRecord> {
        Ok(LogRecord {
            id: row.try_get("id")?,
            machine_id: row.try_get("machine_id")?,
            content: row.try_get("content")?,
            kind: row.try_get("type")?,
            timestamp: row.try_get("timestamp")?,
            log_filepath: row.try_get("log_filepath")?,
        })
    }

    fn event_from_row(row: &SqliteRow) -> StorageResult<EventRecord> {
        let data: Option<String> = row.try_get("data")?;
        let data = data
            .map(|text| serde_json::from_str::<Value>(&text))
            .transpose()
            .map_err(|e| {
                StorageError::SerializationError(format!("failed to parse event data: {}", e))
            })?;

        Ok(EventRecord {
            id: row.try_get("id")?,
            machine_id: row.try_get("machine_id")?,
            kind: row.try_get("type")?,
            timestamp: row.try_get("timestamp")?,
            data,
            log_filepath: row.try_get("log_filepath")?,
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertRecord> {
        Ok(AlertRecord {
            id: row.try_get("id")?,
            machine_id: row.try_get("machine_id")?,
            subject: row.try_get("subject")?,
            reason: row.try_get("reason")?,
            kind: row.try_get("type")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    async fn fetch_by_id(
        &self,
        kind: RecordKind,
        columns: &str,
        id: i64,
    ) -> StorageResult<Option<SqliteRow>> {
        let sql = format!("SELECT {columns} FROM {} WHERE id = ?", kind.table());

        Ok(sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip_all)]
    async fn insert_log(&self, log: NewLog) -> StorageResult<LogRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO logs (machine_id, content, type, timestamp, log_filepath)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.machine_id)
        .bind(&log.content)
        .bind(&log.kind)
        .bind(log.timestamp)
        .bind(&log.log_filepath)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("inserted log {id}");
        Ok(log.with_id(id))
    }

    #[instrument(skip_all)]
    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord> {
        let data_json = event
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| {
                StorageError::SerializationError(format!("failed to serialize event data: {}", e))
            })?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (machine_id, type, timestamp, data, log_filepath)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.machine_id)
        .bind(&event.kind)
        .bind(event.timestamp)
        .bind(data_json)
        .bind(&event.log_filepath)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("inserted event {id}");
        Ok(event.with_id(id))
    }

    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let result = sqlx::query(
                r#"
                INSERT INTO alerts (machine_id, subject, reason, type, timestamp)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&alert.machine_id)
            .bind(&alert.subject)
            .bind(&alert.reason)
            .bind(&alert.kind)
            .bind(alert.timestamp)
            .execute(&mut *tx)
            .await?;

            records.push(alert.with_id(result.last_insert_rowid()));
        }

        tx.commit().await?;

        debug!("inserted {} alerts", records.len());
        Ok(records)
    }

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogRecord>> {
        self.fetch_by_id(RecordKind::Log, LOG_COLUMNS, id)
            .await?
            .as_ref()
            .map(Self::log_from_row)
            .transpose()
    }

    async fn find_event(&self, id: i64) -> StorageResult<Option<EventRecord>> {
        self.fetch_by_id(RecordKind::Event, EVENT_COLUMNS, id)
            .await?
            .as_ref()
            .map(Self::event_from_row)
            .transpose()
    }

    async fn find_alert(&self, id: i64) -> StorageResult<Option<AlertRecord>> {
        self.fetch_by_id(RecordKind::Alert, ALERT_COLUMNS, id)
            .await?
            .as_ref()
            .map(Self::alert_from_row)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_logs(&self, query: &RecordQuery) -> StorageResult<Vec<LogRecord>> {
        query.validate(RecordKind::Log)?;

        let rows = Self::select_query(RecordKind::Log, LOG_COLUMNS, query)
            .build()
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::log_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn find_events(&self, query: &RecordQuery) -> StorageResult<Vec<EventRecord>> {
        query.validate(RecordKind::Event)?;

        let rows = Self::select_query(RecordKind::Event, EVENT_COLUMNS, query)
            .build()
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::event_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn find_alerts(&self, query: &RecordQuery) -> StorageResult<Vec<AlertRecord>> {
        query.validate(RecordKind::Alert)?;

        let rows = Self::select_query(RecordKind::Alert, ALERT_COLUMNS, query)
            .build()
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_by_ids(&self, kind: RecordKind, ids: &[i64]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", kind.table()));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;

        debug!("deleted {} {kind} records", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::from([
            ("backend".to_string(), "sqlite".to_string()),
            ("path".to_string(), self.db_path.clone()),
        ]);

        for kind in [RecordKind::Log, RecordKind::Event, RecordKind::Alert] {
            let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", kind.table()))
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;
            metadata.insert(kind.table().to_string(), count.to_string());
        }

        Ok(HealthStatus {
            healthy: true,
            message: "SQLite storage operational".to_string(),
            metadata,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
