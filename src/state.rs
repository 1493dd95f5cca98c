//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::upload::{UploadOrchestrator, UploadTracker};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    orchestrator: UploadOrchestrator,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, orchestrator: UploadOrchestrator) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, orchestrator }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload orchestrator
    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.inner.orchestrator
    }

    /// Get the upload record tracker
    pub fn tracker(&self) -> &UploadTracker {
        self.inner.orchestrator.tracker()
    }

    /// Stop admitting uploads
    ///
    /// Runs already holding the upload lock are left to finish.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.orchestrator.shutdown();
    }

    /// Wait for runs already past the lock to reach a terminal state
    pub async fn drain(&self) -> usize {
        self.inner.orchestrator.drain().await
    }
}
