//! Application State

use std::sync::Arc;

use assistant_core::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Tool-calling loop; owns the provider, registry and session histories
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
