//! Application state for the web layer.

use std::sync::Arc;

use crate::scenario::Orchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Answers every journey and isochrone request of the coverage.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
