//! Replidb Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationKind;

/// Result type alias for Replidb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Replidb error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Operation errors
    #[error("{0}")]
    Validation(String),

    #[error("Invalid identifier '{0}': expected 1-64 letters, digits or underscores, not starting with a digit")]
    InvalidIdentifier(String),

    #[error("Not permitted: {0}")]
    Authority(String),

    // Schema resolution errors
    #[error("database {0} does not exist")]
    DatabaseNotFound(String),

    #[error("table {table} does not exist in database {database}")]
    TableNotFound { database: String, table: String },

    #[error("no columns found for table {table} in database {database}")]
    NoColumns { database: String, table: String },

    // Backend errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{kind} failed: {source}")]
    Execution {
        kind: OperationKind,
        #[source]
        source: Box<Error>,
    },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Malformed payload: {0}")]
    Codec(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error class carried in error replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Missing or malformed fields for the operation kind
    Validation,
    /// Statement or query failure in the relational backend
    Backend,
    /// Operation not permitted on this node
    Authority,
    /// Database, table or columns could not be resolved
    Schema,
    /// Malformed frame or connection failure
    Transport,
}

impl Error {
    /// Classify this error for the reply envelope
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation(_) | Error::InvalidIdentifier(_) => ErrorClass::Validation,
            Error::Authority(_) => ErrorClass::Authority,
            Error::DatabaseNotFound(_)
            | Error::TableNotFound { .. }
            | Error::NoColumns { .. } => ErrorClass::Schema,
            Error::Database(_) | Error::Sqlite(_) | Error::Backend(_) => ErrorClass::Backend,
            Error::Execution { source, .. } => source.class(),
            Error::Network(_)
            | Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout(_)
            | Error::FrameTooLarge { .. }
            | Error::Codec(_)
            | Error::Io(_) => ErrorClass::Transport,
            Error::Config(_) | Error::ConfigParse(_) => ErrorClass::Validation,
        }
    }

    /// Wrap a backend failure with the kind of operation that caused it
    pub fn during(kind: OperationKind, source: Error) -> Self {
        Error::Execution {
            kind,
            source: Box::new(source),
        }
    }
}
