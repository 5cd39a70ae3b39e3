//! SQLite + Object Storage file store and sync service
//!
//! This crate holds the server side of syncbox: a path keyed file store that
//! keeps metadata in SQLite and content in pluggable object storage
//! (S3/MinIO/local filesystem/memory), and the [`SyncService`] answering
//! every sync operation with permission checks.
//!
//! # Features
//!
//! - Content stored once per SHA-256 hash, metadata keyed by synced path
//! - Per-path write locks
//! - Strict permission enforcement from the stored `_.syftperm` files
//! - [`LocalRemote`], an in-process `SyncRemote` for driving clients without HTTP
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use file_store::{FileStore, LocalRemote, SyncService};
//!
//! # async fn example() -> Result<(), file_store::FileStoreError> {
//! let store = FileStore::new_local(Path::new("/tmp/syncbox-server")).await?;
//! let service = Arc::new(SyncService::new(store));
//! let remote = LocalRemote::new(service, "alice@example.org");
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod remote;
mod service;
mod storage;
mod store;

pub use error::{FileStoreError, Result};
pub use remote::LocalRemote;
pub use service::{ServiceError, SyncService};
pub use storage::StorageConfig;
pub use store::{FileStore, PathGuard, PermissionTreeError};
