use crate::moderation::ThresholdStore;
use crate::session::SessionRegistry;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Monitoring sessions (group → voice connection)
    pub sessions: SessionRegistry,
    /// Per-group decibel thresholds
    pub thresholds: Arc<dyn ThresholdStore>,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, thresholds: Arc<dyn ThresholdStore>) -> Self {
        Self {
            sessions,
            thresholds,
        }
    }
}
