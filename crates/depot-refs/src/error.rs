//! Error types for reference operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The ref name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Another writer holds the ref's lock file.
    #[error("ref is locked by another writer: {}", path.display())]
    Locked { path: PathBuf },

    /// The stored ref value cannot be parsed.
    #[error("corrupt ref {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
