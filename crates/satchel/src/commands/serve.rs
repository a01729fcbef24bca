//! Serve command - runs the session server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use satchel_server::Server;
use satchel_session::{MemoryStore, SessionManager, SessionStore};
use satchel_sqlite::SqliteStore;

use crate::config::{SatchelConfig, StoreSection};

use super::Context;

/// Store backends selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-process store
    Memory,
    /// SQLite database (requires --db)
    Sqlite,
    /// Sessions live in memory only
    None,
}

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Session cookie name (overrides config)
    #[arg(long)]
    pub cookie_name: Option<String>,

    /// Session lifetime in seconds (overrides config)
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Mark session cookies Secure
    #[arg(long)]
    pub secure: bool,

    /// Durable store backend (overrides config)
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// SQLite database path (implies --store sqlite)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &SatchelConfig) -> Result<SatchelConfig> {
        let mut config = config.resolved();

        let mut server = config.server();
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(ref bind) = self.bind {
            server.bind = bind.clone();
        }
        if let Some(ref name) = self.cookie_name {
            server.cookie_name = name.clone();
        }
        config.server = Some(server);

        let mut session = config.session();
        if let Some(secs) = self.max_age {
            session.max_age_secs = secs;
        }
        if self.secure {
            session.secure = true;
        }
        config.session = Some(session);

        let store = match (self.store, &self.db) {
            (Some(StoreKind::Memory), _) => StoreSection::Memory,
            (Some(StoreKind::None), _) => StoreSection::None,
            (Some(StoreKind::Sqlite), Some(path)) | (None, Some(path)) => StoreSection::Sqlite {
                path: path.clone(),
            },
            (Some(StoreKind::Sqlite), None) => match config.store() {
                sqlite @ StoreSection::Sqlite { .. } => sqlite,
                _ => anyhow::bail!("--store sqlite requires --db or a [store] path"),
            },
            (None, None) => config.store(),
        };
        config.store = Some(store);

        Ok(config)
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }
    for source in loaded.loaded_from() {
        info!(path = %source.display(), "Loaded config");
    }

    let config = args.apply(&loaded.config)?;
    if ctx.verbose {
        info!(config = %config.to_toml()?, "Effective configuration");
    }
    let server_config = config.server().to_server_config()?;
    let options = config.session().to_options();

    let sessions = match open_store(&config.store())? {
        Some(store) => SessionManager::with_shared_store(options, store),
        None => SessionManager::new(options),
    };

    let server = Server::new(sessions.clone(), server_config);
    info!(addr = %server.bind_address(), "Satchel listening");

    server
        .run_until(shutdown_signal())
        .await?;

    sessions.flush().await;
    let stats = sessions.mirror_stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        "Store mirror drained"
    );
    Ok(())
}

/// Resolve once Ctrl-C arrives.
///
/// If the handler cannot be installed the error is logged and shutdown
/// starts straight away.
async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

async fn wait_for_shutdown<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!(error = %e, "Failed to install Ctrl-C handler, shutting down"),
    }
}

/// Open the configured durable store.
fn open_store(section: &StoreSection) -> Result<Option<Arc<dyn SessionStore>>> {
    match section {
        StoreSection::Memory => Ok(Some(Arc::new(MemoryStore::new()))),
        StoreSection::None => Ok(None),
        StoreSection::Sqlite { path } => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("failed to open session database {}", path.display()))?;
            let purged = store.purge_expired(Utc::now())?;
            info!(path = %path.display(), purged, "Opened SQLite session store");
            Ok(Some(Arc::new(store)))
        }
    }
}
