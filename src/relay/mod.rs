//! Live telemetry relay
//!
//! Reporting machines hold a WebSocket open and push one sample at a time.
//! The relay keeps a short rolling window per machine and republishes the
//! whole window to viewers after every sample.
//!
//! ## Architecture Overview
//!
//! ```text
//!  reporter ──collect_log──► gateway ──► RelayDispatcher ──► Session (WindowBuffer)
//!                               │               │
//!                          SessionRegistry      └──broadcast──► viewer, viewer, ...
//!                               ▲
//!                        SessionJanitor (expires detached sessions)
//! ```
//!
//! The gateway itself lives in [`crate::api::websocket`], next to the REST routes
//! it shares a router with.

pub mod clock;
pub mod dispatcher;
pub mod janitor;
pub mod messages;
pub mod registry;
pub mod sample;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchOutcome, RelayDispatcher, RelayStats};
pub use janitor::JanitorHandle;
pub use messages::{ClientFrame, WindowUpdate};
pub use registry::{ConnectionHandle, Session, SessionRegistry, SessionStatus, SessionSummary};
pub use sample::{InboundSample, PathError, Sample, SampleError};
pub use window::{WINDOW_SECONDS, WindowBuffer, WindowPolicy};
