//! Error types for the merge library.

use thiserror::Error;

/// Errors that abort a merge run.
///
/// Row-local conditions (an unresolvable foreign key, a conflict with no
/// matching row) are not errors; they are reported as
/// [`Diagnostic`](crate::merge::Diagnostic)s and the run continues.
#[derive(Error, Debug, Clone)]
pub enum MergeError {
    /// A table or column named by the merge plan does not exist in a store
    #[error("Schema error: {0}")]
    Schema(String),

    /// The merge plan itself is malformed (out-of-order dependency, duplicate table)
    #[error("Invalid merge plan: {0}")]
    Plan(String),

    /// The store could not be read, written or committed
    #[error("Store error: {0}")]
    Store(String),

    /// Filesystem error while handling working directories
    #[error("I/O error: {0}")]
    Io(String),

    /// The backup container could not be read or written
    #[error("Archive error: {0}")]
    Archive(String),

    /// Error serializing/deserializing JSON
    #[error("JSON error: {0}")]
    Json(String),

    /// A required input (upload, database file) is absent
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for MergeError {
    fn from(err: rusqlite::Error) -> Self {
        MergeError::Store(err.to_string())
    }
}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        MergeError::Io(err.to_string())
    }
}

impl From<zip::result::ZipError> for MergeError {
    fn from(err: zip::result::ZipError) -> Self {
        MergeError::Archive(err.to_string())
    }
}

impl From<serde_json::Error> for MergeError {
    fn from(err: serde_json::Error) -> Self {
        MergeError::Json(err.to_string())
    }
}

/// Result type alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
