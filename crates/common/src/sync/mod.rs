//! Client side synchronization.
//!
//! The [`SyncManager`] runs one iteration per interval: it snapshots every
//! datasite, diffs it against the server, decides a direction per change,
//! and hands the result to a [`SyncConsumer`] through the [`SyncQueue`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::delta::DeltaError;
use crate::permissions::PermissionError;
use crate::remote::RemoteError;
use crate::state::StateError;

mod consumer;
mod manager;

pub use consumer::{ConsumeReport, SyncConsumer};
pub use manager::SyncManager;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Errors for a single change or a single iteration.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("invalid permission file: {0}")]
    InvalidPermissionFile(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("local copy of {0} changed since the snapshot")]
    Stale(String),
    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("permission tree error: {0}")]
    Permission(#[from] PermissionError),
    #[error("sync folder does not exist: {0}")]
    MissingSyncFolder(PathBuf),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// The change was refused on access or integrity grounds and retrying
    /// the same content will not help.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::PermissionDenied(_)
                | SyncError::InvalidPermissionFile(_)
                | SyncError::Remote(RemoteError::PermissionDenied(_))
                | SyncError::Remote(RemoteError::InvalidPermissionFile(_))
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding one folder per datasite.
    pub datasites: PathBuf,
    pub interval: Duration,
    /// Folder names skipped at any depth.
    pub ignored_folders: Vec<String>,
}

impl SyncConfig {
    pub fn new(datasites: impl Into<PathBuf>) -> Self {
        Self {
            datasites: datasites.into(),
            interval: DEFAULT_SYNC_INTERVAL,
            ignored_folders: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_ignored_folder(mut self, name: impl Into<String>) -> Self {
        self.ignored_folders.push(name.into());
        self
    }
}
