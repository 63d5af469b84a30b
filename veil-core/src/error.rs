//! Error types for the Veil core library.

use thiserror::Error;

/// Top-level error type for all Veil core operations.
#[derive(Error, Debug)]
pub enum VeilError {
    /// An entity with the given id does not exist for this visitor.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Which collection was searched ("seed", "mask", ...).
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A durable blob could not be trusted (bad checksum, unknown schema, garbage bytes).
    #[error("Storage corruption: {0}")]
    StorageCorruption(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The wall clock could not be read.
    #[error("Clock unavailable: {0}")]
    Clock(String),

    /// A downstream listener rejected a narrative event.
    #[error("Event sink failed: {0}")]
    Sink(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VeilError {
    /// Shorthand for a [`VeilError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error is a missing-entity lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error means stored bytes are untrustworthy, as opposed
    /// to the backend being unreachable.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::StorageCorruption(_) | Self::Serialization(_))
    }
}

impl From<serde_json::Error> for VeilError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, VeilError>;
