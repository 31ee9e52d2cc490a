//! Error types for repairgrid-core

use thiserror::Error;

/// Result type alias using repairgrid-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in repairgrid-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence failure (constraint violation, IO inside SQLite, ...)
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Record not found
    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Schema mapping failure between local rows and remote records
    #[error("Translation error: {0}")]
    Translation(String),

    /// Probe or remote call could not reach the remote
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered but rejected the call
    #[error("Remote error: {0}")]
    Remote(String),

    /// Table-scoped sync failure; never fatal to the cycle
    #[error("Sync error in {table}: {message}")]
    Sync { table: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::NotFound { .. } | Self::Io(_))
    }

    pub const fn is_translation(&self) -> bool {
        matches!(self, Self::Translation(_))
    }

    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Remote(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}
