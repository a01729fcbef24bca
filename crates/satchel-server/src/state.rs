//! Application state shared across handlers.

use std::sync::Arc;

use satchel_session::SessionManager;

use crate::config::ServerConfig;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session manager backing every route.
    pub sessions: SessionManager,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(sessions: SessionManager, config: ServerConfig) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
        }
    }

    /// Name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }
}
