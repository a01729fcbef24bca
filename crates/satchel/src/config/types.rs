//! Configuration types.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use satchel_server::ServerConfig;
use satchel_session::{DEFAULT_MIRROR_CAPACITY, DEFAULT_MIRROR_WORKERS, SessionOptions};

use super::{ConfigError, Result};

/// Root configuration.
///
/// Each table is optional so a layer only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatchelConfig {
    /// HTTP server settings.
    pub server: Option<ServerSection>,

    /// Session lifetime and cookie settings.
    pub session: Option<SessionSection>,

    /// Durable store selection.
    pub store: Option<StoreSection>,
}

impl SatchelConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SatchelConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.store.is_some() {
            self.store = other.store;
        }
    }

    /// Server section, or defaults.
    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    /// Session section, or defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Store section, or defaults.
    pub fn store(&self) -> StoreSection {
        self.store.clone().unwrap_or_default()
    }

    /// Fill every absent table with its defaults.
    pub fn resolved(&self) -> Self {
        Self {
            server: Some(self.server()),
            session: Some(self.session()),
            store: Some(self.store()),
        }
    }
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Session cookie name.
    pub cookie_name: String,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind: defaults.bind_address.ip().to_string(),
            port: defaults.bind_address.port(),
            cookie_name: defaults.cookie_name,
            request_logging: defaults.request_logging,
        }
    }
}

impl ServerSection {
    /// Build the server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let ip: IpAddr = self.bind.parse().map_err(|e| ConfigError::InvalidBind {
            bind: self.bind.clone(),
            source: e,
        })?;

        Ok(ServerConfig::new()
            .with_bind_address(SocketAddr::new(ip, self.port))
            .with_cookie_name(self.cookie_name.clone())
            .with_request_logging(self.request_logging))
    }
}

/// `[session]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Session lifetime in seconds.
    pub max_age_secs: u64,
    /// Set the `Secure` cookie attribute.
    pub secure: bool,
    /// Set the `HttpOnly` cookie attribute.
    pub http_only: bool,
    /// Sweep interval in seconds. Defaults to the session lifetime.
    pub sweep_interval_secs: Option<u64>,
    /// Mirror queue capacity.
    pub mirror_capacity: usize,
    /// Mirror worker count.
    pub mirror_workers: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionOptions::default();
        Self {
            max_age_secs: defaults.max_age.as_secs(),
            secure: defaults.secure,
            http_only: defaults.http_only,
            sweep_interval_secs: None,
            mirror_capacity: DEFAULT_MIRROR_CAPACITY,
            mirror_workers: DEFAULT_MIRROR_WORKERS,
        }
    }
}

impl SessionSection {
    /// Build the session manager options.
    pub fn to_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new()
            .with_max_age(Duration::from_secs(self.max_age_secs))
            .with_secure(self.secure)
            .with_http_only(self.http_only)
            .with_mirror_capacity(self.mirror_capacity)
            .with_mirror_workers(self.mirror_workers);

        if let Some(secs) = self.sweep_interval_secs {
            options = options.with_sweep_interval(Duration::from_secs(secs));
        }
        options
    }
}

/// `[store]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSection {
    /// In-process store; survives nothing but exercises the mirror path.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database path.
        path: PathBuf,
    },
    /// No durable store: sessions live in memory only.
    None,
}
