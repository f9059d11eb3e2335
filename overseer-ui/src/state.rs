//! Shared application state for the UI server.

use std::sync::Arc;

use overseer::driver::SynchronizerHandle;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The one synchronizer this server presents.
    pub sync: Arc<SynchronizerHandle>,
}

impl AppState {
    pub fn new(handle: SynchronizerHandle) -> Self {
        Self {
            sync: Arc::new(handle),
        }
    }
}
