use filemorph_core::{Config, ConversionOrchestrator, Supervisor};
use std::sync::Arc;

/// Supervisor shared by every request.
pub type SharedSupervisor = Arc<dyn Supervisor>;

/// Orchestrator type used by the HTTP adapter.
pub type Orchestrator = ConversionOrchestrator<SharedSupervisor>;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Largest accepted upload, in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.config.server.max_upload_bytes).unwrap_or(usize::MAX)
    }
}
