//! Client side record of what was last synced.
//!
//! The manager compares the current local hash of a path against the hash
//! recorded here to tell a local edit apart from a remote one. Per path
//! statuses are kept alongside for diagnostics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::atomic_write::write_atomic;
use crate::changes::SyncSide;
use crate::state::FileMetadata;
use crate::sync_path;

pub const LOCAL_STATE_FILE_NAME: &str = "local_syncstate.json";

#[derive(Debug, thiserror::Error)]
pub enum LocalStateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Queued,
    InProgress,
    Synced,
    Error,
    Rejected,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusInfo {
    pub status: SyncStatus,
    #[serde(default)]
    pub message: Option<String>,
    /// Local hash the status was recorded for.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub side: Option<SyncSide>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    states: BTreeMap<String, FileMetadata>,
    #[serde(default)]
    statuses: BTreeMap<String, SyncStatusInfo>,
}

pub struct LocalSyncState {
    path: Option<PathBuf>,
    records: Mutex<Records>,
}

impl LocalSyncState {
    /// State that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Records::default()),
        }
    }

    /// Load from `path`. A missing file starts empty; an unreadable one is
    /// logged and replaced on the next save.
    pub fn load(path: &Path) -> Result<Self, LocalStateError> {
        let records = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "discarding corrupt local sync state: {}", e);
                    Records::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            records: Mutex::new(records),
        })
    }

    pub fn save(&self) -> Result<(), LocalStateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&*self.records.lock())?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn synced(&self, path: &str) -> Option<FileMetadata> {
        self.records.lock().states.get(path).cloned()
    }

    pub fn synced_hash(&self, path: &str) -> Option<String> {
        self.records
            .lock()
            .states
            .get(path)
            .map(|meta| meta.hash.clone())
    }

    /// Every path with a synced record below `dir`.
    pub fn synced_paths_within(&self, dir: &str) -> Vec<String> {
        self.records
            .lock()
            .states
            .keys()
            .filter(|path| sync_path::is_within(path, dir))
            .cloned()
            .collect()
    }

    /// Record that both sides agree on `path`; `None` means both sides
    /// agree it does not exist.
    pub fn mark_synced(&self, path: &str, metadata: Option<FileMetadata>) {
        let mut records = self.records.lock();
        let hash = metadata.as_ref().map(|meta| meta.hash.clone());
        match metadata {
            Some(meta) => {
                records.states.insert(path.to_string(), meta);
            }
            None => {
                records.states.remove(path);
            }
        }
        records.statuses.insert(
            path.to_string(),
            SyncStatusInfo {
                status: SyncStatus::Synced,
                message: None,
                hash,
                side: None,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn set_status(
        &self,
        path: &str,
        status: SyncStatus,
        side: Option<SyncSide>,
        hash: Option<String>,
        message: Option<String>,
    ) {
        self.records.lock().statuses.insert(
            path.to_string(),
            SyncStatusInfo {
                status,
                message,
                hash,
                side,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn status(&self, path: &str) -> Option<SyncStatusInfo> {
        self.records.lock().statuses.get(path).cloned()
    }

    pub fn statuses(&self) -> BTreeMap<String, SyncStatusInfo> {
        self.records.lock().statuses.clone()
    }
}
