//! Telemetry samples and inbound sample validation

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timestamped telemetry reading from one machine
///
/// Serializes as `{ "type": ..., "data": ... }`; the timestamp is carried as the
/// key of the window it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since epoch, unique within a machine's window
    #[serde(skip)]
    pub timestamp: i64,

    /// Metric category (e.g. `USAGE`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Schema-less reading, indexed by dotted paths
    #[serde(rename = "data")]
    pub payload: Value,
}

impl Sample {
    pub fn new(timestamp: i64, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            payload,
        }
    }

    /// Resolve a dotted path (e.g. `disk.read_bytes`) inside the payload
    ///
    /// Array elements can be addressed by index (`cpus.0.usage`).
    pub fn lookup(&self, path: &str) -> Result<&Value, PathError> {
        if path.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let mut current = &self.payload;
        let mut walked = String::with_capacity(path.len());

        for segment in path.split('.') {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);

            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => {
                    return Err(PathError::NotAnObject {
                        path: walked.clone(),
                    });
                }
            }
            .ok_or_else(|| PathError::MissingField {
                path: walked.clone(),
            })?;
        }

        Ok(current)
    }
}

/// Failure to resolve a payload path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    EmptyPath,

    /// The path (up to and including the failing segment) does not exist
    MissingField { path: String },

    /// A scalar value was reached before the path was exhausted
    NotAnObject { path: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::EmptyPath => write!(f, "empty payload path"),
            PathError::MissingField { path } => write!(f, "missing field '{path}'"),
            PathError::NotAnObject { path } => {
                write!(f, "cannot descend into scalar value at '{path}'")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// A `collect_log` payload after validation
///
/// Accepted shapes:
/// - object: `{"machine_id": "...", "timestamp": 17, "type": "USAGE", "data": {...}}`
/// - positional: `["machine-id", 17, "USAGE", {...}]`
///
/// `timestamp` must be an integer (or a string of digits), `type` a non-empty
/// string. Missing `data` becomes `null`, a missing `machine_id` is left for the
/// caller to fill in from the connection handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundSample {
    pub machine_id: Option<String>,
    pub timestamp: i64,
    pub kind: String,
    pub payload: Value,
}

impl InboundSample {
    pub fn from_value(value: Value) -> Result<Self, SampleError> {
        let (machine_id, timestamp, kind, payload) = match value {
            Value::Object(mut map) => (
                map.remove("machine_id"),
                map.remove("timestamp"),
                map.remove("type"),
                map.remove("data"),
            ),
            Value::Array(items) => {
                let mut items = items.into_iter();
                (items.next(), items.next(), items.next(), items.next())
            }
            other => return Err(SampleError::InvalidShape(type_name(&other))),
        };

        let machine_id = match machine_id {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if id.trim().is_empty() => None,
            Some(Value::String(id)) => Some(id),
            Some(other) => return Err(SampleError::InvalidMachineId(type_name(&other))),
        };

        let timestamp = parse_timestamp(timestamp.ok_or(SampleError::MissingTimestamp)?)?;

        let kind = match kind.ok_or(SampleError::MissingType)? {
            Value::String(kind) if !kind.trim().is_empty() => kind,
            Value::String(_) => return Err(SampleError::InvalidType("empty string")),
            other => return Err(SampleError::InvalidType(type_name(&other))),
        };

        Ok(Self {
            machine_id,
            timestamp,
            kind,
            payload: payload.unwrap_or(Value::Null),
        })
    }

    pub fn into_sample(self) -> Sample {
        Sample::new(self.timestamp, self.kind, self.payload)
    }
}

fn parse_timestamp(value: Value) -> Result<i64, SampleError> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| SampleError::InvalidTimestamp(number.to_string())),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| SampleError::InvalidTimestamp(text)),
        Value::Null => Err(SampleError::MissingTimestamp),
        other => Err(SampleError::InvalidTimestamp(other.to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reasons an inbound sample is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    InvalidShape(&'static str),
    InvalidMachineId(&'static str),
    MissingTimestamp,
    InvalidTimestamp(String),
    MissingType,
    InvalidType(&'static str),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::InvalidShape(got) => {
                write!(f, "expected an object or array sample, got {got}")
            }
            SampleError::InvalidMachineId(got) => {
                write!(f, "machine_id must be a string, got {got}")
            }
            SampleError::MissingTimestamp => write!(f, "sample has no timestamp"),
            SampleError::InvalidTimestamp(raw) => {
                write!(f, "timestamp is not an integer: {raw}")
            }
            SampleError::MissingType => write!(f, "sample has no type"),
            SampleError::InvalidType(got) => write!(f, "type must be a non-empty string, got {got}"),
        }
    }
}

impl std::error::Error for SampleError {}
