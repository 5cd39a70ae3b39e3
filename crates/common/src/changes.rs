//! Change detection between a local and a remote [`DirectoryState`].
//!
//! The detector only classifies paths that are out of sync. Every change it
//! emits is oriented as a pull (make the local side match the remote one);
//! the sync manager decides per change whether to keep it that way or
//! [`reverse`](FileChangeInfo::reverse) it into a push.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::permissions::is_permission_file;
use crate::state::DirectoryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Create,
    Write,
    Delete,
}

impl std::fmt::Display for FileChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileChangeKind::Create => write!(f, "create"),
            FileChangeKind::Write => write!(f, "write"),
            FileChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Which side a change modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSide {
    /// Pull: update the local copy from the remote.
    Local,
    /// Push: update the remote copy from the local one.
    Remote,
}

/// One out-of-sync path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeInfo {
    pub kind: FileChangeKind,
    pub path: String,
    pub side: SyncSide,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    /// Size of the source side content, 0 for deletes.
    pub size: u64,
}

impl FileChangeInfo {
    fn classify(local: Option<&str>, remote: Option<&str>, side: SyncSide) -> Option<FileChangeKind> {
        let (source, target) = match side {
            SyncSide::Local => (remote, local),
            SyncSide::Remote => (local, remote),
        };
        match (source, target) {
            (Some(_), None) => Some(FileChangeKind::Create),
            (None, Some(_)) => Some(FileChangeKind::Delete),
            (Some(a), Some(b)) if a != b => Some(FileChangeKind::Write),
            _ => None,
        }
    }

    /// Hash the modified side must end up with, `None` for deletes.
    pub fn expected_hash(&self) -> Option<&str> {
        match self.side {
            SyncSide::Local => self.remote_hash.as_deref(),
            SyncSide::Remote => self.local_hash.as_deref(),
        }
    }

    pub fn is_permission_file(&self) -> bool {
        is_permission_file(&self.path)
    }

    /// Lower runs first: permission files, then by size.
    pub fn priority(&self) -> u64 {
        if self.is_permission_file() {
            0
        } else {
            self.size.max(1)
        }
    }

    /// The same divergence oriented the other way.
    pub fn reverse(self, local_size: u64) -> Self {
        let side = match self.side {
            SyncSide::Local => SyncSide::Remote,
            SyncSide::Remote => SyncSide::Local,
        };
        // kind always exists: the hashes still differ
        let kind = Self::classify(self.local_hash.as_deref(), self.remote_hash.as_deref(), side)
            .unwrap_or(self.kind);
        let size = match (side, kind) {
            (_, FileChangeKind::Delete) => 0,
            (SyncSide::Remote, _) => local_size,
            (SyncSide::Local, _) => self.size,
        };
        Self {
            kind,
            side,
            size,
            ..self
        }
    }
}

/// Every path whose hash differs between the two snapshots, permission
/// files first, then in path order.
pub fn diff(local: &DirectoryState, remote: &DirectoryState) -> Vec<FileChangeInfo> {
    let paths: BTreeSet<&String> = local.tree.keys().chain(remote.tree.keys()).collect();

    let mut changes: Vec<FileChangeInfo> = paths
        .into_iter()
        .filter_map(|path| {
            let local_meta = local.get(path);
            let remote_meta = remote.get(path);
            let local_hash = local_meta.map(|meta| meta.hash.as_str());
            let remote_hash = remote_meta.map(|meta| meta.hash.as_str());
            let kind = FileChangeInfo::classify(local_hash, remote_hash, SyncSide::Local)?;
            Some(FileChangeInfo {
                kind,
                path: path.clone(),
                side: SyncSide::Local,
                local_hash: local_hash.map(str::to_string),
                remote_hash: remote_hash.map(str::to_string),
                size: remote_meta.map(|meta| meta.size).unwrap_or(0),
            })
        })
        .collect();

    // stable: path order is kept within each group
    changes.sort_by_key(|change| !change.is_permission_file());
    changes
}
