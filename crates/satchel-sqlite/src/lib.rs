//! SQLite-backed durable store for satchel sessions.
//!
//! Records live in a single `sessions` table keyed by session ID. Values
//! are stored as a JSON object, expiry as a fixed-width RFC 3339 string.

mod error;
mod store;

pub use error::{Result, SqliteError};
pub use store::SqliteStore;
