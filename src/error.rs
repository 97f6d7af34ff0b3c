//! Error types for blobdepot

use thiserror::Error;

/// Result type alias for blobdepot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in blobdepot operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("storage is not open")]
    NotOpen,

    #[error("storage is already open")]
    AlreadyOpen,

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
