//! Error types for session operations.

use crate::store::StoreError;

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session record read back from the store had already expired.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The requested key is not set in the session.
    #[error("Value not set: {0}")]
    ValueAbsent(String),

    /// The decode destination cannot be written in place.
    #[error("Destination for '{0}' is not writable")]
    DestinationNotWritable(String),

    /// The stored value cannot be decoded into the destination type.
    #[error("Value '{key}' does not match the destination shape: {source}")]
    ShapeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded into the session's value bag.
    #[error("Failed to encode value '{key}': {source}")]
    ValueEncoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The OS randomness source failed while generating a session ID.
    #[error("Failed to generate session ID: {0}")]
    IdGeneration(String),

    /// No durable store is configured, or its mirror queue has shut down.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A direct store operation failed.
    #[error("Store operation failed: {0}")]
    StoreOperationFailed(#[from] StoreError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
