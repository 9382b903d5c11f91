//! RelayDispatcher - bridges inbound samples to window updates
//!
//! ## Message Flow
//!
//! ```text
//! collect_log → on_sample → Session::record (upsert + evict) → WindowUpdate → [viewer, viewer, ...]
//! ```
//!
//! Updates go out on a `broadcast` channel. Sending never blocks: a slow viewer
//! lags and skips updates on its own receiver without holding up the next sample.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

use super::clock::{Clock, SystemClock};
use super::messages::{SharedUpdate, WindowUpdate};
use super::registry::{ConnectionId, SessionRegistry};
use super::sample::Sample;

/// Default capacity of the viewer broadcast channel
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// What happened to a sample handed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Inserted and published; `receivers` viewers were subscribed at the time
    Relayed { receivers: usize },

    /// No attached session for the machine; nothing changed
    Dropped,
}

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub relayed: u64,
    pub dropped: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    relayed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Applies samples to session windows and publishes the results
pub struct RelayDispatcher {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    update_tx: broadcast::Sender<SharedUpdate>,
    counters: Counters,
}

impl RelayDispatcher {
    /// Create a dispatcher using the wall clock
    pub fn new(registry: Arc<SessionRegistry>, broadcast_capacity: usize) -> Self {
        Self::with_clock(registry, broadcast_capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry: Arc<SessionRegistry>,
        broadcast_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(broadcast_capacity.max(1));

        Self {
            registry,
            clock,
            update_tx,
            counters: Counters::default(),
        }
    }

    /// Handle one sample from `machine_id`
    ///
    /// Samples for unknown or detached machines are dropped silently. Every
    /// successful insertion publishes exactly one update with the full window.
    #[instrument(skip_all, fields(machine = %machine_id, timestamp = timestamp))]
    pub async fn on_sample(
        &self,
        machine_id: &str,
        timestamp: i64,
        kind: &str,
        payload: Value,
    ) -> DispatchOutcome {
        let Some(session) = self.registry.get(machine_id).await else {
            debug!("no session for machine, dropping sample at {timestamp}");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Dropped;
        };

        let now = self.clock.now();
        let Some(logs) = session
            .record(now, Sample::new(timestamp, kind, payload))
            .await
        else {
            debug!("session detached, dropping sample at {timestamp}");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Dropped;
        };

        self.counters.relayed.fetch_add(1, Ordering::Relaxed);

        let update = Arc::new(WindowUpdate {
            machine_id: machine_id.to_string(),
            logs,
        });

        // No subscribers is fine, viewers come and go.
        let receivers = match self.update_tx.send(update) {
            Ok(receivers) => {
                trace!("published window update to {receivers} viewers");
                receivers
            }
            Err(_) => {
                trace!("no viewers for window update");
                0
            }
        };

        DispatchOutcome::Relayed { receivers }
    }

    /// Detach `machine_id` after `connection_id` went away, stamped with the
    /// dispatcher's clock
    pub async fn detach(&self, machine_id: &str, connection_id: ConnectionId) -> bool {
        self.registry
            .detach(machine_id, connection_id, self.clock.now())
            .await
    }

    /// Count a sample that failed validation before reaching `on_sample`
    pub fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Subscribe to window updates for all machines
    pub fn subscribe(&self) -> broadcast::Receiver<SharedUpdate> {
        self.update_tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.update_tx.receiver_count()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            relayed: self.counters.relayed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}
