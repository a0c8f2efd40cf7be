//! Store error types.

use thiserror::Error;

/// Errors raised while reading (or seeding) the provider/binding store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A record violates a store invariant (duplicate id, empty pattern).
    #[error("invalid record: {reason}")]
    Invalid { reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization {
            reason: e.to_string(),
        }
    }
}
