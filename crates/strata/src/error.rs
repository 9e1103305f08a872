//! Error types for Strata

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// Storage-related errors (LanceDB, snapshot files, backend failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A tier refused a write because it would exceed its configured capacity
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// The record is not present in any tier
    #[error("Memory not found: {0}")]
    NotFound(Uuid),

    /// Tier migration errors (invalid direction, edge tier, lost source)
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search engine errors (lexical or vector backend)
    #[error("Search error: {0}")]
    Search(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
