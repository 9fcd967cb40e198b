//! HTTP and WebSocket API

mod handlers;
mod types;
mod ws;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::ProviderRegistry;
use crate::orchestrator::TurnOrchestrator;
use crate::store::FileStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    pub fn new(store: Arc<FileStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            orchestrator: Arc::new(TurnOrchestrator::new(store, registry)),
        }
    }

    pub fn store(&self) -> &Arc<FileStore> {
        self.orchestrator.store()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.orchestrator.registry()
    }
}
