//! Parser for syslog-style `auth.log` lines
//!
//! ```text
//! Mar  4 09:15:02 web-1 sshd[2211]: Accepted publickey for deploy from 10.0.0.5
//! ```
//!
//! The log carries no year; the caller supplies it.

use std::fmt;

use chrono::{NaiveDateTime, TimeZone};
use serde::Serialize;
use serde_json::{Value, json};

/// One parsed `auth.log` entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthEvent {
    pub timestamp: i64,
    pub hostname: String,
    pub process: String,
    pub pid: Option<u32>,
    pub action: String,
    pub raw_content: String,
}

impl AuthEvent {
    /// Structured fields stored as the event's `data`
    pub fn props(&self) -> Value {
        json!({
            "hostname": self.hostname,
            "process": self.process,
            "pid": self.pid,
            "action": self.action,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthParseError {
    /// Fewer than the five leading fields (month, day, time, host, process)
    TooShort,
    InvalidTimestamp(String),
}

impl fmt::Display for AuthParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthParseError::TooShort => write!(f, "line has too few fields"),
            AuthParseError::InvalidTimestamp(raw) => write!(f, "invalid timestamp '{raw}'"),
        }
    }
}

impl std::error::Error for AuthParseError {}

/// Parse one line, interpreting its time in `tz` during `year`
pub fn parse_auth_line<Tz: TimeZone>(
    line: &str,
    year: i32,
    tz: &Tz,
) -> Result<AuthEvent, AuthParseError> {
    let raw_content = line.trim();
    let fields: Vec<&str> = raw_content.split_whitespace().collect();

    let [month, day, time, hostname, process_field, action @ ..] = fields.as_slice() else {
        return Err(AuthParseError::TooShort);
    };

    let stamp = format!("{year} {month} {day} {time}");
    let timestamp = NaiveDateTime::parse_from_str(&stamp, "%Y %b %d %H:%M:%S")
        .ok()
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .ok_or_else(|| AuthParseError::InvalidTimestamp(format!("{month} {day} {time}")))?
        .timestamp();

    // "sshd[2211]:" or "CRON:" / "systemd-logind:"
    let process_field = process_field.trim_end_matches(':');
    let (process, pid) = match process_field.split_once('[') {
        Some((name, rest)) => (name, rest.trim_end_matches(']').parse().ok()),
        None => (process_field, None),
    };

    Ok(AuthEvent {
        timestamp,
        hostname: hostname.to_string(),
        process: process.to_string(),
        pid,
        action: action.join(" "),
        raw_content: raw_content.to_string(),
    })
}
