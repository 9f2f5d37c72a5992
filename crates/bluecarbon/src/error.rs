//! Error types for bluecarbon.
//!
//! This module defines all error types used throughout the bluecarbon crate.
//! Every failure in the record core is a typed outcome; nothing here is fatal
//! to the process.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for bluecarbon operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Record Errors ===
    /// Caller-supplied data violates a required-field or referential rule.
    ///
    /// No partial record is created when this is returned.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the first offending form field.
        field: &'static str,
        /// Description of the violation.
        message: String,
    },

    /// An update targeted an identifier that does not exist.
    #[error("no record with id {id} in collection '{collection}'")]
    NotFound {
        /// Storage key of the collection.
        collection: &'static str,
        /// The identifier that was looked up.
        id: u64,
    },

    /// A durable write failed; the in-memory view was rolled back.
    #[error("failed to persist collection '{collection}': {message}")]
    Persistence {
        /// Storage key of the collection.
        collection: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Sync Errors ===
    /// A manual sync was requested while offline.
    #[error("no network connection available")]
    NoConnection,

    /// The remote authority rejected or timed out a single record push.
    #[error("push of {kind} #{id} failed: {reason}")]
    PushFailure {
        /// Storage key of the record's collection.
        kind: &'static str,
        /// The record identifier.
        id: u64,
        /// Why the push failed.
        reason: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for bluecarbon operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error for the named field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a persistence error for the named collection.
    #[must_use]
    pub fn persistence(collection: &'static str, message: impl Into<String>) -> Self {
        Self::Persistence {
            collection,
            message: message.into(),
        }
    }

    /// Create a push failure for a single record.
    #[must_use]
    pub fn push_failure(kind: &'static str, id: u64, reason: impl Into<String>) -> Self {
        Self::PushFailure {
            kind,
            id,
            reason: reason.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Name of the offending field if this is a validation error.
    #[must_use]
    pub fn invalid_field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Check if this error is a validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error indicates the device is offline.
    #[must_use]
    pub fn is_no_connection(&self) -> bool {
        matches!(self, Self::NoConnection)
    }

    /// Check if this error is a durable-write failure.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Check if this error is a missing-record lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
