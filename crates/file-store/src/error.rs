//! Error types for the file store.

use common::sync_path::PathError;

/// Errors that can occur when working with the file store.
#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Rejected synced path
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// File not found
    #[error("file not found: {0}")]
    NotFound(String),

    /// Metadata points at content that is gone
    #[error("missing content for {path} ({hash})")]
    MissingContent { path: String, hash: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting the server.")]
    BucketNotFound(String),
}

/// Result type alias for file store operations.
pub type Result<T> = std::result::Result<T, FileStoreError>;
