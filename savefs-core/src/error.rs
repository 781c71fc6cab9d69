//! Error types for the virtual filesystem and its stores.

use thiserror::Error;

/// Errors that can occur during filesystem and store operations.
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Path cannot be empty")]
    EmptyPath,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Path already exists with a different kind: {0}")]
    Conflict(String),

    #[error("\"{0}\" is a file, expected directory")]
    NotADirectory(String),

    #[error("Parent directory does not exist: {0}")]
    ParentMissing(String),

    #[error("\"{0}\" is not empty. Pass recursive to remove it")]
    DirectoryNotEmpty(String),

    #[error("Cannot move onto \"{0}\": destination is not empty")]
    DestinationNotEmpty(String),

    #[error("Removing root requires recursive")]
    RootRemoval,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("File is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for filesystem operations.
pub type VfsResult<T> = Result<T, VfsError>;
