//! FileStore - path keyed file storage backed by SQLite + object storage.
//!
//! Metadata rows map a synced path to the hash of its content; the content
//! itself is stored once per hash. Replacing a file uploads the new content
//! first and then flips the metadata row, so readers never see a partial
//! write.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use common::permissions::{self, ParseMode, PermissionError, PermissionTree};
use common::state::{hash_bytes, FileMetadata};
use common::sync_path;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::{FileStoreError, Result};
use crate::storage::{Storage, StorageConfig};

/// Proof that the holder has exclusive write access to one path.
pub struct PathGuard {
    path: String,
    _guard: OwnedMutexGuard<()>,
}

impl PathGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One async mutex per path with a pending or active writer.
#[derive(Debug, Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    async fn lock(&self, path: &str) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock();
            // drop entries nobody is holding or waiting on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(path.to_string()).or_default().clone()
        };
        PathGuard {
            path: path.to_string(),
            _guard: lock.lock_owned().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    db: Database,
    storage: Storage,
    locks: Arc<PathLocks>,
    /// Held shared while content is being referenced, exclusively while
    /// unreferenced content is collected.
    content: Arc<RwLock<()>>,
}

impl FileStore {
    /// Create a new FileStore with a file-based SQLite database.
    pub async fn new(db_path: &Path, config: StorageConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new FileStore with an in-memory SQLite database.
    pub async fn in_memory(config: StorageConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new FileStore kept entirely below `data_dir`.
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("files.db");
        let objects_path = data_dir.join("objects");
        Self::new(&db_path, StorageConfig::Local { path: objects_path }).await
    }

    /// Create a fully ephemeral FileStore (in-memory DB + in-memory object storage).
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(StorageConfig::Memory).await
    }

    fn from_parts(db: Database, storage: Storage) -> Self {
        Self {
            db,
            storage,
            locks: Arc::new(PathLocks::default()),
            content: Arc::new(RwLock::new(())),
        }
    }

    /// Wait for exclusive write access to `path`.
    pub async fn lock(&self, path: &str) -> Result<PathGuard> {
        let path = sync_path::normalize(path)?;
        Ok(self.locks.lock(&path).await)
    }

    pub async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        let path = sync_path::normalize(path)?;
        self.db.get_file(&path).await
    }

    /// Content and metadata of `path`.
    pub async fn get(&self, path: &str) -> Result<(Bytes, FileMetadata)> {
        let path = sync_path::normalize(path)?;
        let meta = self
            .db
            .get_file(&path)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(path.clone()))?;
        let bytes = self
            .storage
            .get_data(&meta.hash)
            .await?
            .ok_or_else(|| FileStoreError::MissingContent {
                path: path.clone(),
                hash: meta.hash.clone(),
            })?;
        Ok((bytes, meta))
    }

    /// Create or replace `path`.
    pub async fn put(&self, path: &str, data: Bytes) -> Result<FileMetadata> {
        let guard = self.lock(path).await?;
        self.put_locked(&guard, data).await
    }

    /// [`put`](Self::put) for a caller already holding the path lock.
    pub async fn put_locked(&self, guard: &PathGuard, data: Bytes) -> Result<FileMetadata> {
        let path = guard.path();
        let previous = self.db.get_file(path).await?;

        let meta = FileMetadata {
            path: path.to_string(),
            hash: hash_bytes(&data),
            size: data.len() as u64,
            last_modified: Utc::now(),
        };
        debug!(path = %path, hash = %meta.hash, size = meta.size, "storing file");

        {
            let _content = self.content.read().await;
            self.storage.put_data(&meta.hash, data).await?;
            self.db.upsert_file(&meta).await?;
        }

        if let Some(previous) = previous {
            if previous.hash != meta.hash {
                self.release_content(&previous.hash).await;
            }
        }
        Ok(meta)
    }

    /// Remove `path`, returning whether it existed. Removing a missing file
    /// is not an error.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let guard = self.lock(path).await?;
        let Some(meta) = self.db.get_file(guard.path()).await? else {
            return Ok(false);
        };
        self.db.delete_file(guard.path()).await?;
        self.release_content(&meta.hash).await;
        debug!(path = %guard.path(), "deleted file");
        Ok(true)
    }

    /// Drop stored content once no path refers to it anymore.
    async fn release_content(&self, hash: &str) {
        let _content = self.content.write().await;
        match self.db.hash_in_use(hash).await {
            Ok(false) => {
                if let Err(e) = self.storage.delete_data(hash).await {
                    warn!(hash = %hash, "failed to delete unreferenced content: {}", e);
                }
            }
            Ok(true) => {}
            Err(e) => warn!(hash = %hash, "failed to check content references: {}", e),
        }
    }

    /// Metadata of every file at or below `dir`; the empty dir lists all.
    pub async fn list(&self, dir: &str) -> Result<Vec<FileMetadata>> {
        let dir = if dir.trim_matches('/').is_empty() {
            String::new()
        } else {
            sync_path::normalize(dir)?
        };
        self.db.list_files(&dir).await
    }

    pub async fn list_datasites(&self) -> Result<Vec<String>> {
        self.db.list_datasites().await
    }

    /// Build the permission tree of `datasite` from the permission files
    /// stored for it.
    pub async fn permission_tree(
        &self,
        datasite: &str,
        mode: ParseMode,
    ) -> std::result::Result<PermissionTree, PermissionTreeError> {
        let mut files = Vec::new();
        for meta in self.list(datasite).await? {
            if !permissions::is_permission_file(&meta.path) {
                continue;
            }
            match self.get(&meta.path).await {
                Ok((bytes, _)) => files.push((meta.path, bytes.to_vec())),
                // deleted since listing
                Err(FileStoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(PermissionTree::from_files(files, mode)?)
    }
}

/// Failure to assemble a permission tree from stored files.
#[derive(Debug, thiserror::Error)]
pub enum PermissionTreeError {
    #[error(transparent)]
    Store(#[from] FileStoreError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
}
