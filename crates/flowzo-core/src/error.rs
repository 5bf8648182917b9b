//! Core error types for flowzo-core.
//!
//! Each layer has its own thiserror enum; [`CoreError`] wraps them for
//! callers that do not care which layer failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Core error type for flowzo-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session state machine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Ledger storage errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Issue tracker errors
    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the session state machine.
///
/// These are caller mistakes and are never retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The requested operation is not legal from the current state.
    #[error("{reason} (current state: {state})")]
    InvalidState {
        state: SessionState,
        reason: &'static str,
    },
}

/// Ledger-specific errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to open the ledger database
    #[error("Failed to open ledger at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A record for this session already exists
    #[error("Session record already exists: {0}")]
    DuplicateSession(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Event payload could not be encoded or decoded
    #[error("Payload encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored timestamp could not be parsed
    #[error("Invalid stored timestamp '{0}'")]
    Timestamp(String),

    /// The ledger connection lock was poisoned by a panicking writer
    #[error("Ledger connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Could not determine or create the data directory
    #[error("Cannot prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write the configuration file
    #[error("Failed to access configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Unknown dot-path key
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Issue tracker integration errors.
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// No credential stored for the service
    #[error("{service} is not authenticated. Run 'flowzo auth {service} login' first.")]
    NotAuthenticated { service: &'static str },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{service} API error: HTTP {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },

    /// GraphQL-level error payload
    #[error("{service} GraphQL error: {message}")]
    GraphQl {
        service: &'static str,
        message: String,
    },

    /// Response did not have the expected shape
    #[error("Unexpected {service} response: missing {field}")]
    MissingField {
        service: &'static str,
        field: &'static str,
    },

    /// OS keyring failure
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
