//! Error types for the granule index.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GranuleError>;

#[derive(Debug, Error)]
pub enum GranuleError {
    /// Malformed envelope, predicate, record or schema.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The catalog at `location` could not be opened.
    #[error("Failed to open catalog at '{location}': {reason}")]
    Open { location: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog rejected a read or write.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The spatial tree cannot be built because the catalog holds no granules.
    #[error("Granule index is empty, spatial tree cannot be built")]
    EmptyIndex,

    /// The index or catalog has already been disposed.
    #[error("Granule index has been disposed")]
    Disposed,

    #[error("Invalid snapshot format")]
    InvalidFormat,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GranuleError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        GranuleError::InvalidArgument(msg.into())
    }

    pub(crate) fn open(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        GranuleError::Open {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(feature = "snapshot")]
impl From<bincode::Error> for GranuleError {
    fn from(e: bincode::Error) -> Self {
        GranuleError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for GranuleError {
    fn from(e: serde_json::Error) -> Self {
        GranuleError::Serialization(e.to_string())
    }
}
