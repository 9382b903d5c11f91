//! Reporting agent
//!
//! Runs on each attested machine and feeds the hub two ways:
//!
//! - [`streamer`]: a `USAGE` sample every interval over the relay WebSocket
//! - [`forwarder`]: new `auth.log` and `audit.log` lines as events and raw
//!   logs over REST

pub mod audit_log;
pub mod auth_log;
pub mod forwarder;
pub mod streamer;
pub mod usage;

pub use audit_log::{AuditEvent, AuditParseError, AuditParser, EVENT_TYPES};
pub use auth_log::{AuthEvent, AuthParseError, parse_auth_line};
pub use forwarder::{LogForwarder, LogKind, TailState};
pub use streamer::UsageStreamer;
pub use usage::{UsageReport, UsageSampler};

/// Event type of usage samples
pub const USAGE: &str = "USAGE";

/// Event type of parsed `auth.log` lines
pub const AUTH: &str = "AUTH";

/// Relay endpoint for a hub base URL (`http://host:3000` → `ws://host:3000/socket`)
pub fn socket_url(server: &str) -> String {
    let server = server.trim_end_matches('/');

    let base = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    };

    format!("{base}/socket")
}
