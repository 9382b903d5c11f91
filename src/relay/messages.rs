//! Message types for the relay
//!
//! ## Wire frames
//!
//! Every WebSocket text frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//!
//! - inbound `collect_log`: one sample from a reporting machine
//! - outbound `receive_logs`: the full window of one machine after an update
//!
//! ## Actor commands
//!
//! Control messages for the session janitor follow the same command/oneshot
//! pattern as the rest of the hub.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tokio::sync::oneshot;

use super::sample::Sample;

/// Inbound event name carrying a sample
pub const COLLECT_LOG: &str = "collect_log";

/// Outbound event name carrying a window snapshot
pub const RECEIVE_LOGS: &str = "receive_logs";

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Raw `collect_log` payload, validated later by `InboundSample`
    CollectLog(Value),

    /// Any other event name; not handled by the relay
    Other(String),
}

impl ClientFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;

        Ok(match envelope.event.as_str() {
            COLLECT_LOG => ClientFrame::CollectLog(envelope.data),
            _ => ClientFrame::Other(envelope.event),
        })
    }

    /// Encode a sample as a `collect_log` frame (used by reporting agents)
    pub fn collect_log(machine_id: &str, timestamp: i64, kind: &str, data: &Value) -> String {
        serde_json::json!({
            "event": COLLECT_LOG,
            "data": {
                "machine_id": machine_id,
                "timestamp": timestamp,
                "type": kind,
                "data": data,
            }
        })
        .to_string()
    }
}

/// Published after every successful insertion into a machine's window
///
/// `logs` is the complete window, not a delta. It serializes as a JSON object
/// keyed by the stringified timestamp, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowUpdate {
    pub machine_id: String,

    #[serde(serialize_with = "serialize_logs")]
    pub logs: Vec<Sample>,
}

impl WindowUpdate {
    /// Encode as a `receive_logs` frame
    pub fn to_frame(&self) -> serde_json::Result<String> {
        // Not via `Value`: its maps sort the timestamp keys as strings.
        serde_json::to_string(&OutboundFrame {
            event: RECEIVE_LOGS,
            data: self,
        })
    }
}

#[derive(Serialize)]
struct OutboundFrame<'a, T: Serialize> {
    event: &'static str,
    data: &'a T,
}

fn serialize_logs<S: Serializer>(logs: &[Sample], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(logs.len()))?;
    for sample in logs {
        map.serialize_entry(&sample.timestamp.to_string(), sample)?;
    }
    map.end()
}

/// Updates are shared between all viewer connections
pub type SharedUpdate = Arc<WindowUpdate>;

/// Commands that can be sent to the SessionJanitor
#[derive(Debug)]
pub enum JanitorCommand {
    /// Sweep expired sessions immediately and report the removed machine ids
    SweepNow {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Gracefully shut down the janitor
    Shutdown,
}
