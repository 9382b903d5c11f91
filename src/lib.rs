//! Attestation hub and agent
//!
//! Machines stream telemetry samples over a WebSocket; the hub keeps a short
//! rolling window per machine and relays every update to live viewers. Logs,
//! events and alerts are persisted separately behind a small REST API.

pub mod agent;
pub mod api;
pub mod config;
pub mod relay;
pub mod storage;
pub mod util;
