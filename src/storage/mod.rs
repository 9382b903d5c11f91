//! Persistence for logs, events and alerts
//!
//! The relay's sample windows are never persisted; this module only backs
//! the REST record endpoints.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async so handlers can await them directly
//! - **Validated queries**: sort fields are checked against a column whitelist
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database behind the `storage-sqlite` feature
//! - **In-Memory**: No persistence, for tests or a relay-only hub
//!
//! ## Usage
//!
//! ```no_run
//! use attestation_server::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./attestation.db").await?;
//!     let health = backend.health_check().await?;
//!     println!("{}", health.message);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod query;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use query::{RecordQuery, SortOrder};
pub use schema::{
    AlertRecord, EventRecord, LogRecord, NewAlert, NewEvent, NewLog, RecordKind,
};
