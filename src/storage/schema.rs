//! Persistent record definitions
//!
//! Three record kinds share the machine id namespace with the live relay:
//!
//! - **Log**: a raw log line (e.g. one `auth.log` entry) and where it came from
//! - **Event**: a parsed occurrence with structured `data`
//! - **Alert**: a flagged condition with subject and reason
//!
//! Every field except `id` is optional, matching what reporting agents send.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three persisted entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Log,
    Event,
    Alert,
}

impl RecordKind {
    pub fn table(self) -> &'static str {
        match self {
            RecordKind::Log => "logs",
            RecordKind::Event => "events",
            RecordKind::Alert => "alerts",
        }
    }

    /// Columns a listing may be sorted by
    pub fn sortable_columns(self) -> &'static [&'static str] {
        match self {
            RecordKind::Log => &[
                "id",
                "machine_id",
                "content",
                "type",
                "timestamp",
                "log_filepath",
            ],
            RecordKind::Event => &["id", "machine_id", "type", "timestamp", "log_filepath"],
            RecordKind::Alert => &["id", "machine_id", "subject", "reason", "type", "timestamp"],
        }
    }

    /// Singular / plural nouns used in API messages
    pub fn nouns(self) -> (&'static str, &'static str) {
        match self {
            RecordKind::Log => ("Log", "Logs"),
            RecordKind::Event => ("Event", "Events"),
            RecordKind::Alert => ("Alert", "Alerts"),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Log => write!(f, "log"),
            RecordKind::Event => write!(f, "event"),
            RecordKind::Alert => write!(f, "alert"),
        }
    }
}

/// A stored log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub machine_id: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
    pub log_filepath: Option<String>,
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub machine_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
    pub data: Option<Value>,
    pub log_filepath: Option<String>,
}

/// A stored alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub machine_id: Option<String>,
    pub subject: Option<String>,
    pub reason: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
}

/// Log as submitted to `POST /api/log/add`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLog {
    pub machine_id: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
    pub log_filepath: Option<String>,
}

impl NewLog {
    pub fn with_id(self, id: i64) -> LogRecord {
        LogRecord {
            id,
            machine_id: self.machine_id,
            content: self.content,
            kind: self.kind,
            timestamp: self.timestamp,
            log_filepath: self.log_filepath,
        }
    }
}

/// Event as submitted to `POST /api/event/add`
///
/// Older agents send the structured part as `props`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewEvent {
    pub machine_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
    #[serde(alias = "props")]
    pub data: Option<Value>,
    pub log_filepath: Option<String>,
}

impl NewEvent {
    pub fn with_id(self, id: i64) -> EventRecord {
        EventRecord {
            id,
            machine_id: self.machine_id,
            kind: self.kind,
            timestamp: self.timestamp,
            data: self.data,
            log_filepath: self.log_filepath,
        }
    }
}

/// Alert as submitted (in an array) to `POST /api/alert/add`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewAlert {
    pub machine_id: Option<String>,
    pub subject: Option<String>,
    pub reason: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<i64>,
}

impl NewAlert {
    pub fn with_id(self, id: i64) -> AlertRecord {
        AlertRecord {
            id,
            machine_id: self.machine_id,
            subject: self.subject,
            reason: self.reason,
            kind: self.kind,
            timestamp: self.timestamp,
        }
    }
}
