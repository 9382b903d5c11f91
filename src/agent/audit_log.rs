//! Parser for auditd records in `/var/log/audit/audit.log`
//!
//! ```text
//! type=USER_AUTH msg=audit(1700000000.123:456): pid=1234 uid=0 auid=4294967295 ses=4294967295 msg='op=PAM:authentication grantors=pam_unix acct="deploy" exe="/usr/sbin/sshd" hostname=10.0.0.5 addr=10.0.0.5 terminal=ssh res=success'
//! ```
//!
//! Only the record types in [`EVENT_TYPES`] are forwarded. Each keeps its
//! record type as the event type; the fields listed for it in [`fields_for`]
//! become the event's `data`, under readable names.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Record types worth forwarding
pub const EVENT_TYPES: [&str; 13] = [
    "CONFIG_CHANGE",
    "KERNEL",
    "EXECVE",
    "SERVICE_START",
    "SERVICE_STOP",
    "ADD_USER",
    "ADD_GROUP",
    "ANOM_LOGIN_FAILURES",
    "CHGRP_ID",
    "CHUSER_ID",
    "USER_LOGIN",
    "USER_ACCT",
    "USER_AUTH",
];

const USER_FIELDS: &[(&str, &str)] = &[
    ("pid", "pid"),
    ("uid", "uid"),
    ("op", "operation"),
    ("grantors", "grantors"),
    ("acct", "account"),
    ("exe", "exec_path"),
    ("hostname", "hostname"),
    ("addr", "address"),
    ("terminal", "terminal"),
];

const LOGIN_FIELDS: &[(&str, &str)] = &[
    ("id", "user_id"),
    ("pid", "pid"),
    ("uid", "uid"),
    ("op", "operation"),
    ("grantors", "grantors"),
    ("acct", "account"),
    ("exe", "exec_path"),
    ("hostname", "hostname"),
    ("addr", "address"),
    ("terminal", "terminal"),
];

const CHUSER_FIELDS: &[(&str, &str)] = &[
    ("op", "operation"),
    ("acct", "account"),
    ("exe", "exec_path"),
    ("hostname", "hostname"),
    ("addr", "address"),
    ("terminal", "terminal"),
    ("old", "old_value"),
    ("new", "new_value"),
];

const CHGRP_FIELDS: &[(&str, &str)] = &[("op", "operation"), ("target", "target"), ("name", "name")];

const SERVICE_FIELDS: &[(&str, &str)] = &[
    ("pid", "pid"),
    ("uid", "uid"),
    ("unit", "unit"),
    ("comm", "command"),
    ("exe", "exec_path"),
];

/// `(audit key, data name)` pairs extracted for `record_type`
///
/// Types like `ANOM_LOGIN_FAILURES` carry nothing beyond their type and time.
pub fn fields_for(record_type: &str) -> &'static [(&'static str, &'static str)] {
    match record_type {
        "USER_AUTH" | "USER_ACCT" => USER_FIELDS,
        "USER_LOGIN" => LOGIN_FIELDS,
        "CHUSER_ID" => CHUSER_FIELDS,
        "CHGRP_ID" => CHGRP_FIELDS,
        "SERVICE_START" | "SERVICE_STOP" => SERVICE_FIELDS,
        _ => &[],
    }
}

/// One forwarded audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub timestamp: i64,
    pub record_type: String,
    pub attributes: Map<String, Value>,
    pub raw_content: String,
}

impl AuditEvent {
    /// Structured fields stored as the event's `data`
    pub fn props(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditParseError {
    /// No `seconds.millis` stamp in the `msg=audit(...)` part
    MissingTimestamp,
    MissingType,
}

impl fmt::Display for AuditParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditParseError::MissingTimestamp => write!(f, "record has no timestamp"),
            AuditParseError::MissingType => write!(f, "record has no type"),
        }
    }
}

impl std::error::Error for AuditParseError {}

/// Compiled patterns for audit records, built once per forwarder
#[derive(Debug, Clone)]
pub struct AuditParser {
    timestamp: Regex,
    record_type: Regex,
    fields: HashMap<&'static str, Regex>,
}

impl AuditParser {
    pub fn new() -> Result<Self, regex::Error> {
        let mut fields = HashMap::new();
        for record_type in EVENT_TYPES {
            for (key, _) in fields_for(record_type) {
                if !fields.contains_key(key) {
                    // `\b` keeps `id=` from matching inside `pid=`/`uid=`,
                    // and `name=` inside `hostname=`
                    let pattern = format!(r#"\b{key}=("[^"]*"|[^\s'"]+)"#);
                    fields.insert(*key, Regex::new(&pattern)?);
                }
            }
        }

        Ok(Self {
            timestamp: Regex::new(r"(\d{10})\.\d{3}")?,
            record_type: Regex::new(r"type=([A-Z_]+)")?,
            fields,
        })
    }

    /// Parse one record
    ///
    /// Returns `Ok(None)` for well-formed records of a type that is not
    /// forwarded.
    pub fn parse(&self, line: &str) -> Result<Option<AuditEvent>, AuditParseError> {
        let raw_content = line.trim();

        let timestamp = self
            .timestamp
            .captures(raw_content)
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .ok_or(AuditParseError::MissingTimestamp)?;

        let record_type = self
            .record_type
            .captures(raw_content)
            .map(|caps| caps[1].to_string())
            .ok_or(AuditParseError::MissingType)?;

        if !EVENT_TYPES.contains(&record_type.as_str()) {
            return Ok(None);
        }

        let mut attributes = Map::new();
        for (key, name) in fields_for(&record_type) {
            let Some(value) = self
                .fields
                .get(key)
                .and_then(|re| re.captures(raw_content))
                .map(|caps| caps[1].trim_matches('"').to_string())
            else {
                continue;
            };

            let value = if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                value.parse::<u64>().map(Value::from).unwrap_or(Value::String(value))
            } else {
                Value::String(value)
            };
            attributes.insert(name.to_string(), value);
        }

        Ok(Some(AuditEvent {
            timestamp,
            record_type,
            attributes,
            raw_content: raw_content.to_string(),
        }))
    }
}
