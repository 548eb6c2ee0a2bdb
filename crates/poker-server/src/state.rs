//! Shared application state.

use crate::config::Config;
use crate::hub::Hub;
use poker_core::{ConnectionId, IssueTracker};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared application state.
pub struct AppState {
    pub hub: Hub,
    pub tracker: Option<Arc<dyn IssueTracker>>,
    pub config: Config,
    next_connection: AtomicU64,
}

impl AppState {
    pub fn new(config: Config, tracker: Option<Arc<dyn IssueTracker>>) -> Self {
        Self {
            hub: Hub::new(),
            tracker,
            config,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Allocate a process-unique connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }
}
