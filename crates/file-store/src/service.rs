//! Server side of every sync wire operation.
//!
//! Each call is made on behalf of an identity and checked against the
//! strict permission tree of the datasite it touches, built from the
//! permission files currently in the store. The owner of a datasite always
//! has full access to it, so a corrupt tree never locks its owner out.
//! Mutations are authorized before any bytes are written.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use bytes::Bytes;
use common::delta::{self, DeltaError};
use common::permissions::{self, ParseMode, PermissionError, PermissionTree};
use common::remote::{ApplyDiffResponse, DiffResponse, RemoteError};
use common::state::{hash_bytes, FileMetadata};
use common::sync_path;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::FileStoreError;
use crate::store::{FileStore, PermissionTreeError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("hash mismatch, skipped writing: {0}")]
    HashMismatch(String),
    #[error("invalid permission file: {0}")]
    InvalidPermissionFile(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("store error: {0}")]
    Store(FileStoreError),
    #[error("permission tree error: {0}")]
    Permission(#[from] PermissionError),
    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileStoreError> for ServiceError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::NotFound(path) => ServiceError::NotFound(path),
            FileStoreError::InvalidPath(e) => ServiceError::BadRequest(e.to_string()),
            other => ServiceError::Store(other),
        }
    }
}

impl From<PermissionTreeError> for ServiceError {
    fn from(err: PermissionTreeError) -> Self {
        match err {
            PermissionTreeError::Store(e) => e.into(),
            PermissionTreeError::Permission(e) => e.into(),
        }
    }
}

impl From<ServiceError> for RemoteError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(m) => RemoteError::NotFound(m),
            ServiceError::PermissionDenied(m) => RemoteError::PermissionDenied(m),
            ServiceError::HashMismatch(m) => RemoteError::HashMismatch(m),
            ServiceError::InvalidPermissionFile(m) => RemoteError::InvalidPermissionFile(m),
            ServiceError::BadRequest(m) => RemoteError::BadRequest(m),
            ServiceError::Delta(e) => RemoteError::BadRequest(e.to_string()),
            other => RemoteError::Server(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct SyncService {
    store: FileStore,
}

impl SyncService {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Permission tree used to authorize `identity` inside `datasite`.
    async fn tree_for(&self, identity: &str, datasite: &str) -> Result<PermissionTree, ServiceError> {
        if identity == datasite {
            // owners bypass the tree entirely
            return Ok(PermissionTree::new());
        }
        Ok(self
            .store
            .permission_tree(datasite, ParseMode::Strict)
            .await?)
    }

    /// Normalize `path` and check that `identity` may access it.
    async fn authorize(&self, identity: &str, path: &str, access: Access) -> Result<String, ServiceError> {
        let path = sync_path::normalize(path).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        let tree = self.tree_for(identity, sync_path::datasite_of(&path)).await?;
        let caps = tree.resolve_effective(identity, &path);
        let allowed = match access {
            Access::Read => caps.can_read,
            Access::Write if permissions::is_permission_file(&path) => caps.can_admin,
            Access::Write => caps.can_write,
        };
        if !allowed {
            warn!(identity = %identity, path = %path, ?access, "access denied");
            return Err(ServiceError::PermissionDenied(path));
        }
        Ok(path)
    }

    fn validate_permission_file(path: &str, data: &[u8]) -> Result<(), ServiceError> {
        if permissions::is_permission_file(path) && !permissions::is_valid(data) {
            return Err(ServiceError::InvalidPermissionFile(path.to_string()));
        }
        Ok(())
    }

    pub async fn metadata(&self, identity: &str, path: &str) -> Result<FileMetadata, ServiceError> {
        let path = self.authorize(identity, path, Access::Read).await?;
        self.store
            .metadata(&path)
            .await?
            .ok_or(ServiceError::NotFound(path))
    }

    /// Diff that turns the caller's content (described by `signature`) into
    /// the stored content.
    pub async fn get_diff(
        &self,
        identity: &str,
        path: &str,
        signature: &[u8],
    ) -> Result<DiffResponse, ServiceError> {
        let path = self.authorize(identity, path, Access::Read).await?;
        let (bytes, meta) = self.store.get(&path).await?;
        let diff = delta::diff(signature, &bytes)?;
        debug!(path = %path, diff_size = diff.len(), "computed diff");
        Ok(DiffResponse {
            path,
            diff,
            hash: meta.hash,
        })
    }

    pub async fn signature(&self, identity: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.authorize(identity, path, Access::Read).await?;
        let (bytes, _) = self.store.get(&path).await?;
        Ok(delta::signature(&bytes))
    }

    /// Patch the stored content with `diff`, storing the result only if it
    /// hashes to `expected_hash`.
    pub async fn apply_diff(
        &self,
        identity: &str,
        path: &str,
        diff: &[u8],
        expected_hash: &str,
    ) -> Result<ApplyDiffResponse, ServiceError> {
        let path = self.authorize(identity, path, Access::Write).await?;
        let guard = self.store.lock(&path).await?;

        let (base, previous) = self.store.get(&path).await?;
        let patched = delta::apply(&base, diff)?;
        let actual = hash_bytes(&patched);
        if actual != expected_hash {
            warn!(path = %path, expected = %expected_hash, actual = %actual, "hash mismatch, skipped writing");
            return Err(ServiceError::HashMismatch(path));
        }
        Self::validate_permission_file(&path, &patched)?;

        let meta = self.store.put_locked(&guard, Bytes::from(patched)).await?;
        info!(identity = %identity, path = %path, "applied diff");
        Ok(ApplyDiffResponse {
            path,
            current_hash: meta.hash,
            previous_hash: previous.hash,
        })
    }

    pub async fn create(
        &self,
        identity: &str,
        path: &str,
        data: Bytes,
    ) -> Result<FileMetadata, ServiceError> {
        if sync_path::file_name(path).contains('%') {
            return Err(ServiceError::BadRequest(format!(
                "file names may not contain '%': {}",
                path
            )));
        }
        let path = self.authorize(identity, path, Access::Write).await?;
        Self::validate_permission_file(&path, &data)?;

        let guard = self.store.lock(&path).await?;
        if self.store.metadata(&path).await?.is_some() {
            return Err(ServiceError::BadRequest(format!(
                "file already exists: {}",
                path
            )));
        }
        let meta = self.store.put_locked(&guard, data).await?;
        info!(identity = %identity, path = %path, size = meta.size, "created file");
        Ok(meta)
    }

    /// Deleting a missing file succeeds.
    pub async fn delete(&self, identity: &str, path: &str) -> Result<(), ServiceError> {
        let path = self.authorize(identity, path, Access::Write).await?;
        if self.store.delete(&path).await? {
            info!(identity = %identity, path = %path, "deleted file");
        }
        Ok(())
    }

    pub async fn download(&self, identity: &str, path: &str) -> Result<Bytes, ServiceError> {
        let path = self.authorize(identity, path, Access::Read).await?;
        let (bytes, _) = self.store.get(&path).await?;
        Ok(bytes)
    }

    /// Zip archive of every readable file among `paths`, entries named by
    /// their synced path. Paths that are missing, malformed or unreadable
    /// are left out.
    pub async fn download_bulk(&self, identity: &str, paths: &[String]) -> Result<Vec<u8>, ServiceError> {
        let mut trees: HashMap<String, PermissionTree> = HashMap::new();
        let mut entries = Vec::with_capacity(paths.len());

        for path in paths {
            let path = match sync_path::normalize(path) {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %path, "skipping bulk download entry: {}", e);
                    continue;
                }
            };
            let datasite = sync_path::datasite_of(&path).to_string();
            if !trees.contains_key(&datasite) {
                let tree = self.tree_for(identity, &datasite).await?;
                trees.insert(datasite.clone(), tree);
            }
            let readable = trees
                .get(&datasite)
                .map(|tree| tree.resolve_effective(identity, &path).can_read)
                .unwrap_or(false);
            if !readable {
                warn!(identity = %identity, path = %path, "skipping unreadable bulk download entry");
                continue;
            }
            match self.store.get(&path).await {
                Ok((bytes, _)) => entries.push((path, bytes)),
                Err(FileStoreError::NotFound(_)) => {
                    warn!(path = %path, "skipping missing bulk download entry");
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(identity = %identity, requested = paths.len(), included = entries.len(), "building bulk archive");
        build_archive(&entries)
    }

    /// Readable metadata below `dir`.
    pub async fn dir_state(&self, identity: &str, dir: &str) -> Result<Vec<FileMetadata>, ServiceError> {
        let dir = sync_path::normalize(dir).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        let tree = self.tree_for(identity, sync_path::datasite_of(&dir)).await?;
        Ok(self.readable(identity, &tree, self.store.list(&dir).await?))
    }

    /// Readable metadata of every datasite that has any. Datasites whose
    /// permission tree cannot be parsed are skipped.
    pub async fn datasite_states(
        &self,
        identity: &str,
    ) -> Result<BTreeMap<String, Vec<FileMetadata>>, ServiceError> {
        let mut states = BTreeMap::new();
        for datasite in self.store.list_datasites().await? {
            let tree = match self.tree_for(identity, &datasite).await {
                Ok(tree) => tree,
                Err(ServiceError::Permission(e)) => {
                    error!(datasite = %datasite, "skipping datasite with corrupt permissions: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let files = self.readable(identity, &tree, self.store.list(&datasite).await?);
            if !files.is_empty() {
                states.insert(datasite, files);
            }
        }
        Ok(states)
    }

    fn readable(
        &self,
        identity: &str,
        tree: &PermissionTree,
        files: Vec<FileMetadata>,
    ) -> Vec<FileMetadata> {
        files
            .into_iter()
            .filter(|meta| tree.resolve_effective(identity, &meta.path).can_read)
            .collect()
    }
}

fn build_archive(entries: &[(String, Bytes)]) -> Result<Vec<u8>, ServiceError> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (path, bytes) in entries {
        zip.start_file(path.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}
