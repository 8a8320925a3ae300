//! Error types for filedb
//!
//! Read-path corruption never reaches this type: empty or unparsable record
//! files are reported as absent. Everything here is a loud failure.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for filedb operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Query Errors
    // ==========================================================================
    #[error("Unsupported query: {statement}")]
    UnsupportedQuery { statement: String },

    #[error("Query parse error: {message}")]
    Parse { message: String },

    #[error("Invalid data for INSERT into '{table}': {reason}")]
    InvalidInsertData { table: String, reason: &'static str },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    FileDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    DirRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    // ==========================================================================
    // Background Tasks
    // ==========================================================================
    #[error("Background task failed: {message}")]
    Task { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for filedb operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<filesql::ParseError> for Error {
    fn from(err: filesql::ParseError) -> Self {
        match err {
            filesql::ParseError::Unsupported { statement } => Error::UnsupportedQuery { statement },
            other => Error::Parse {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError;

        match err {
            ValidationError::InvalidIdentifier { kind, value, reason } => {
                Error::InvalidIdentifier { kind, value, reason }
            }
            ValidationError::TooLong { kind, value, .. } => Error::InvalidIdentifier {
                kind,
                value,
                reason: "exceeds maximum length",
            },
            ValidationError::Empty { kind } => Error::InvalidIdentifier {
                kind,
                value: String::new(),
                reason: "cannot be empty",
            },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::UnsupportedQuery { .. } => Some(
                "Supported statements: INSERT INTO, SELECT, UPDATE, DELETE, CREATE TABLE, SHOW TABLES",
            ),
            Error::InvalidInsertData { .. } => {
                Some("Pass the record as the first param or list columns: INSERT INTO t (a, b) VALUES (?, ?)")
            }
            Error::InvalidIdentifier { .. } => {
                Some("Table names and record keys may only use letters, digits, underscores and hyphens")
            }
            Error::Config { .. } => Some("Check the YAML config file against the documented keys"),
            _ => None,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedQuery { .. }
                | Error::Parse { .. }
                | Error::InvalidInsertData { .. }
                | Error::InvalidIdentifier { .. }
        )
    }
}
