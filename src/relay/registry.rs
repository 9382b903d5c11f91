//! Session registry: `machine_id -> Session`
//!
//! ## Locking
//!
//! The map sits behind a `RwLock`, each session's mutable state behind its own
//! `Mutex`. The map lock may be held while a session lock is acquired, never
//! the other way around, so sessions of different machines never contend with
//! each other.
//!
//! ## Lifecycle
//!
//! ```text
//! register ──► Attached ──detach──► Detached ──grace expired──► removed
//!                 ▲                     │
//!                 └──────register───────┘   (window carried over)
//! ```
//!
//! Registering an id whose session is still attached replaces the connection,
//! starts an empty window and closes the superseded connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use super::sample::{PathError, Sample};
use super::window::{WindowBuffer, WindowPolicy};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a live transport connection
///
/// The connection task waits on [`ConnectionHandle::closed`]; the registry calls
/// [`ConnectionHandle::close`] when the connection is superseded.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            close: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Ask the connection task to shut down
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Resolves once `close` has been called (also if it was called earlier)
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Attachment state of a session; `since` is in relay clock seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Attached,
    Detached { since: i64 },
}

#[derive(Debug)]
struct SessionState {
    connection: ConnectionHandle,
    window: WindowBuffer,
    status: SessionStatus,
}

/// Live association between a machine, its connection and its window
#[derive(Debug)]
pub struct Session {
    machine_id: String,
    state: Mutex<SessionState>,
}

/// Read-only view of a session for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub machine_id: String,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub connection_id: ConnectionId,
    pub samples: usize,
    pub latest_timestamp: Option<i64>,
}

impl Session {
    fn new(machine_id: String, connection: ConnectionHandle, policy: WindowPolicy) -> Self {
        Self {
            machine_id,
            state: Mutex::new(SessionState {
                connection,
                window: WindowBuffer::new(policy),
                status: SessionStatus::Attached,
            }),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Insert a sample and return the resulting window
    ///
    /// Upsert, eviction and snapshot happen under one lock. Returns `None`
    /// without touching the window when the session is detached.
    pub async fn record(&self, now: i64, sample: Sample) -> Option<Vec<Sample>> {
        let mut state = self.state.lock().await;

        if state.status != SessionStatus::Attached {
            return None;
        }

        state.window.insert(now, sample);
        Some(state.window.snapshot())
    }

    /// Mark the session detached if `connection_id` is still its connection
    async fn detach(&self, connection_id: ConnectionId, at: i64) -> bool {
        let mut state = self.state.lock().await;

        if state.connection.id() != connection_id || state.status != SessionStatus::Attached {
            return false;
        }

        state.status = SessionStatus::Detached { since: at };
        true
    }

    /// Attach a new connection, closing the previous one if it was still live
    async fn attach(&self, connection: ConnectionHandle) {
        let mut state = self.state.lock().await;

        match state.status {
            SessionStatus::Attached => {
                warn!(
                    "machine {} registered again while connected, closing connection {}",
                    self.machine_id,
                    state.connection.id()
                );
                state.connection.close();
                state.window.clear();
            }
            SessionStatus::Detached { since } => {
                debug!(
                    "machine {} reattached (detached since {since}), keeping {} samples",
                    self.machine_id,
                    state.window.len()
                );
            }
        }

        state.connection = connection;
        state.status = SessionStatus::Attached;
    }

    async fn expired(&self, now: i64, grace_secs: i64) -> bool {
        match self.state.lock().await.status {
            SessionStatus::Detached { since } => now.saturating_sub(since) > grace_secs,
            SessionStatus::Attached => false,
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> Vec<Sample> {
        self.state.lock().await.window.snapshot()
    }

    pub async fn series(&self, path: &str) -> Result<Vec<(i64, serde_json::Value)>, PathError> {
        self.state.lock().await.window.series(path)
    }

    pub async fn summary(&self) -> SessionSummary {
        let state = self.state.lock().await;

        SessionSummary {
            machine_id: self.machine_id.clone(),
            status: state.status,
            connection_id: state.connection.id(),
            samples: state.window.len(),
            latest_timestamp: state.window.latest_timestamp(),
        }
    }
}

/// Process-wide table of sessions, shared as `Arc<SessionRegistry>`
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    policy: WindowPolicy,
}

impl SessionRegistry {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Create or re-attach the session for `machine_id`
    ///
    /// An empty (or whitespace) id creates nothing and returns `None`.
    pub async fn register(
        &self,
        machine_id: &str,
        connection: ConnectionHandle,
    ) -> Option<Arc<Session>> {
        let machine_id = machine_id.trim();
        if machine_id.is_empty() {
            return None;
        }

        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get(machine_id) {
            let session = session.clone();
            session.attach(connection).await;
            return Some(session);
        }

        info!(
            "registered session for machine {machine_id} (connection {})",
            connection.id()
        );

        let session = Arc::new(Session::new(
            machine_id.to_string(),
            connection,
            self.policy,
        ));
        sessions.insert(machine_id.to_string(), session.clone());

        Some(session)
    }

    pub async fn get(&self, machine_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(machine_id).cloned()
    }

    /// Detach the session after its connection went away at `now`
    ///
    /// Ignored when the session has since been taken over by another
    /// connection. Returns whether the session was detached.
    pub async fn detach(&self, machine_id: &str, connection_id: ConnectionId, now: i64) -> bool {
        let Some(session) = self.get(machine_id).await else {
            return false;
        };

        let detached = session.detach(connection_id, now).await;
        if detached {
            info!("machine {machine_id} detached, window retained");
        }
        detached
    }

    pub async fn remove(&self, machine_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(machine_id)
    }

    /// Remove sessions detached for longer than `grace_secs` before `now`
    pub async fn remove_expired(&self, now: i64, grace_secs: i64) -> Vec<String> {
        let mut sessions = self.sessions.write().await;

        let mut expired = Vec::new();
        for (machine_id, session) in sessions.iter() {
            if session.expired(now, grace_secs).await {
                expired.push(machine_id.clone());
            }
        }

        for machine_id in &expired {
            sessions.remove(machine_id);
        }

        expired
    }

    /// Summaries of all sessions, sorted by machine id
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }
}
