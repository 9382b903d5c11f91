//! API shared state

use std::sync::Arc;

use crate::relay::{RelayDispatcher, SessionRegistry};
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Record store behind the log/event/alert endpoints
    pub storage: Arc<dyn StorageBackend>,

    /// Relay dispatcher; owns the viewer broadcast channel and the registry
    pub dispatcher: Arc<RelayDispatcher>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn StorageBackend>, dispatcher: Arc<RelayDispatcher>) -> Self {
        Self {
            storage,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.dispatcher.registry()
    }
}
