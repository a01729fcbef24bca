//! CLI command handlers.

pub mod config;
pub mod serve;

use std::path::PathBuf;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// User config directory override.
    pub config_dir: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Discover and merge configuration for this invocation.
    pub fn load_config(&self) -> crate::config::Result<crate::config::LoadedConfig> {
        crate::config::load_config_with_options(None, self.config_dir.as_deref())
    }
}
