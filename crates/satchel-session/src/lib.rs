//! Cookie-addressed session management.
//!
//! This crate keeps per-client sessions in memory, keyed by an opaque ID
//! carried in a cookie:
//! - A concurrent session table with per-session expiry
//! - Identity resolution with an optional durable-store fallback
//! - A background sweeper evicting expired sessions
//! - Typed value access backed by serde
//! - Asynchronous mirroring of saves and deletions to the store
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel_session::{CookieJar, SessionManager, SessionOptions};
//!
//! let manager = SessionManager::new(
//!     SessionOptions::default().with_max_age(Duration::from_secs(1800)),
//! );
//!
//! let mut response = CookieJar::new();
//! let mut session = manager.resolve(&request, &mut response, "session").await?;
//! manager.set_and_save(&mut session, "counter", 1, &mut response).await?;
//! ```

mod config;
mod cookie;
mod error;
mod id;
mod manager;
mod mirror;
mod session;
mod store;
mod sweeper;
mod table;
mod value;

pub use config::{
    DEFAULT_MAX_AGE, DEFAULT_MIRROR_CAPACITY, DEFAULT_MIRROR_WORKERS, SessionOptions, expiry_after,
};
pub use cookie::{COOKIE_PATH, CookieJar, CookieSink, CookieSource, SessionCookie};
pub use error::{Error, Result};
pub use id::{SESSION_ID_BYTES, generate_session_id};
pub use manager::SessionManager;
pub use mirror::MirrorStats;
pub use session::Session;
pub use store::{MemoryStore, SaveOutcome, SessionStore, StoreError, StoreResult};
pub use table::SessionTable;
pub use value::Value;
