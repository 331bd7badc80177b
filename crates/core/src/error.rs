//! Error types for the state store
//!
//! One taxonomy is shared by every layer. Driver failures that are not
//! otherwise classified travel as [`BackingStoreError`] inside
//! [`Error::Backend`].

use std::fmt;
use thiserror::Error;

/// Message used for writes against a read-only store.
///
/// Kept identical to the message SQLite reports for the same condition so
/// operators see one recognizable string whichever layer caught it.
pub const READ_ONLY_MESSAGE: &str = "attempt to write a readonly database";

/// All state store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration option could not be parsed or is out of range
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A write was attempted against a store opened read-only
    #[error("{}", READ_ONLY_MESSAGE)]
    ReadOnlyStore,

    /// The key does not exist
    #[error("not found: {key}")]
    NotFound {
        /// Key that was looked up
        key: String,
    },

    /// Conditional write or delete whose etag did not match the stored one
    #[error("possible etag mismatch: key {key}")]
    ETagMismatch {
        /// First key whose condition failed
        key: String,
    },

    /// A stored payload could not be decoded
    #[error("corrupt record{}: {reason}", .key.as_ref().map(|k| format!(" for key {k}")).unwrap_or_default())]
    CorruptRecord {
        /// Key of the offending row, when known
        key: Option<String>,
        /// What failed to decode
        reason: String,
    },

    /// A query expression is malformed
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A request is malformed (empty key, empty etag, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller's cancellation token was tripped
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The store has been closed
    #[error("store is closed")]
    Closed,

    /// Unclassified backing store failure
    #[error("backing store error: {0}")]
    Backend(#[from] BackingStoreError),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a driver error as an opaque backing store failure.
    pub fn backend<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(BackingStoreError::new(source))
    }

    /// Backing store failure described only by a message.
    pub fn backend_msg(message: impl Into<String>) -> Self {
        Error::Backend(BackingStoreError::msg(message))
    }

    /// Build a corrupt record error without a key.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptRecord {
            key: None,
            reason: reason.into(),
        }
    }

    /// Attach a key to a [`Error::CorruptRecord`] that has none.
    pub fn with_key(self, key: &str) -> Self {
        match self {
            Error::CorruptRecord { key: None, reason } => Error::CorruptRecord {
                key: Some(key.to_string()),
                reason,
            },
            other => other,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this is an etag conflict.
    pub fn is_etag_mismatch(&self) -> bool {
        matches!(self, Error::ETagMismatch { .. })
    }

    /// Check if this error was raised because the store is read-only.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Error::ReadOnlyStore)
    }

    /// Check if the operation was abandoned because of a deadline or cancellation.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DeadlineExceeded | Error::Cancelled)
    }
}

/// Opaque wrapper around a lower-level driver failure.
#[derive(Debug)]
pub struct BackingStoreError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BackingStoreError {
    /// Wrap a driver error.
    pub fn new<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Failure with no underlying error value.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Human-readable description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackingStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackingStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
