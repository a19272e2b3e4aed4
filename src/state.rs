//! Shared application state
//!
//! State handed to every route handler. Cloning is cheap; the registry is
//! internally shared and the configuration is read-only after startup.

use crate::config::ServerConfig;
use crate::relay::SessionRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration assembled at startup
    pub config: ServerConfig,
    /// Directory of live and recently closed relay sessions
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Create application state from a loaded configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(),
        }
    }
}
