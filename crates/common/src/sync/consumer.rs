use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::SyncError;
use crate::atomic_write::{remove_if_exists, write_atomic};
use crate::changes::{FileChangeInfo, FileChangeKind, SyncSide};
use crate::delta;
use crate::local_state::{LocalSyncState, SyncStatus};
use crate::permissions::{self, PermissionTree};
use crate::queue::SyncQueue;
use crate::remote::SyncRemote;
use crate::state::{hash_bytes, FileMetadata};
use crate::sync_path;

/// Outcome counts of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub applied: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for ConsumeReport {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Applies queued changes one at a time.
///
/// Every change is checked against the local file as it is now, not as it
/// was when the change was detected: a file edited in between is skipped
/// and picked up again by the next iteration.
pub struct SyncConsumer {
    remote: Arc<dyn SyncRemote>,
    datasites: PathBuf,
    queue: Arc<SyncQueue>,
    local_state: Arc<LocalSyncState>,
}

impl SyncConsumer {
    pub fn new(
        remote: Arc<dyn SyncRemote>,
        datasites: impl Into<PathBuf>,
        queue: Arc<SyncQueue>,
        local_state: Arc<LocalSyncState>,
    ) -> Self {
        Self {
            remote,
            datasites: datasites.into(),
            queue,
            local_state,
        }
    }

    /// Drain the queue. Per change failures are logged and recorded in the
    /// local sync state, never returned.
    ///
    /// `trees` maps datasite to the permission snapshot pushes are checked
    /// against; a datasite without an entry grants nothing to non-owners.
    pub async fn consume_all(&self, trees: &BTreeMap<String, PermissionTree>) -> ConsumeReport {
        let mut report = ConsumeReport::default();
        let empty = PermissionTree::new();

        while let Some(change) = self.queue.dequeue() {
            let tree = trees
                .get(sync_path::datasite_of(&change.path))
                .unwrap_or(&empty);
            self.local_state.set_status(
                &change.path,
                SyncStatus::InProgress,
                Some(change.side),
                change.local_hash.clone(),
                None,
            );

            match self.process(&change, tree).await {
                Ok(()) => {
                    tracing::debug!(
                        path = %change.path,
                        kind = %change.kind,
                        side = ?change.side,
                        "applied change"
                    );
                    report.applied += 1;
                }
                Err(SyncError::Stale(path)) => {
                    tracing::debug!(path = %path, "skipping stale change");
                    self.local_state.set_status(
                        &change.path,
                        SyncStatus::Queued,
                        Some(change.side),
                        change.local_hash.clone(),
                        Some("changed during sync".to_string()),
                    );
                    report.skipped += 1;
                }
                Err(e) if e.is_rejection() => {
                    tracing::warn!(path = %change.path, kind = %change.kind, "change rejected: {}", e);
                    self.local_state.set_status(
                        &change.path,
                        SyncStatus::Rejected,
                        Some(change.side),
                        change.local_hash.clone(),
                        Some(e.to_string()),
                    );
                    report.rejected += 1;
                }
                Err(e) => {
                    tracing::error!(path = %change.path, kind = %change.kind, "failed to apply change: {}", e);
                    self.local_state.set_status(
                        &change.path,
                        SyncStatus::Error,
                        Some(change.side),
                        change.local_hash.clone(),
                        Some(e.to_string()),
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Apply a single change.
    pub async fn process(
        &self,
        change: &FileChangeInfo,
        tree: &PermissionTree,
    ) -> Result<(), SyncError> {
        match change.side {
            SyncSide::Local => self.pull(change).await,
            SyncSide::Remote => {
                self.check_push_allowed(change, tree)?;
                self.push(change).await
            }
        }
    }

    fn check_push_allowed(
        &self,
        change: &FileChangeInfo,
        tree: &PermissionTree,
    ) -> Result<(), SyncError> {
        let caps = tree.resolve_effective(self.remote.identity(), &change.path);
        let allowed = if change.is_permission_file() {
            caps.can_admin
        } else {
            caps.can_write
        };
        if allowed {
            Ok(())
        } else {
            Err(SyncError::PermissionDenied(format!(
                "{} may not {} {}",
                self.remote.identity(),
                change.kind,
                change.path
            )))
        }
    }

    async fn pull(&self, change: &FileChangeInfo) -> Result<(), SyncError> {
        let fs_path = sync_path::to_fs_path(&self.datasites, &change.path);
        let local = read_if_exists(&fs_path).await?;
        if local.as_deref().map(hash_bytes) != change.local_hash {
            return Err(SyncError::Stale(change.path.clone()));
        }

        let Some(expected) = change.expected_hash() else {
            let path = fs_path.clone();
            tokio::task::spawn_blocking(move || remove_if_exists(&path)).await??;
            self.local_state.mark_synced(&change.path, None);
            return Ok(());
        };

        let bytes = match (change.kind, local) {
            (FileChangeKind::Write, Some(local)) => {
                let signature = delta::signature(&local);
                let response = self.remote.get_diff(&change.path, &signature).await?;
                delta::apply(&local, &response.diff)?
            }
            _ => self.remote.download(&change.path).await?,
        };

        let actual = hash_bytes(&bytes);
        if actual != expected {
            return Err(SyncError::HashMismatch {
                path: change.path.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
        if change.is_permission_file() && !permissions::is_valid(&bytes) {
            return Err(SyncError::InvalidPermissionFile(change.path.clone()));
        }

        let metadata = FileMetadata {
            path: change.path.clone(),
            hash: actual,
            size: bytes.len() as u64,
            last_modified: Utc::now(),
        };
        tokio::task::spawn_blocking(move || write_atomic(&fs_path, &bytes)).await??;
        self.local_state.mark_synced(&change.path, Some(metadata));
        Ok(())
    }

    async fn push(&self, change: &FileChangeInfo) -> Result<(), SyncError> {
        let fs_path = sync_path::to_fs_path(&self.datasites, &change.path);
        let local = read_if_exists(&fs_path).await?;
        if local.as_deref().map(hash_bytes) != change.local_hash {
            return Err(SyncError::Stale(change.path.clone()));
        }

        let Some(bytes) = local else {
            self.remote.delete(&change.path).await?;
            self.local_state.mark_synced(&change.path, None);
            return Ok(());
        };

        if change.is_permission_file() && !permissions::is_valid(&bytes) {
            return Err(SyncError::InvalidPermissionFile(change.path.clone()));
        }

        let metadata = match change.kind {
            FileChangeKind::Write => {
                let signature = self.remote.signature(&change.path).await?;
                let diff = delta::diff(&signature, &bytes)?;
                let hash = hash_bytes(&bytes);
                let response = self.remote.apply_diff(&change.path, &diff, &hash).await?;
                FileMetadata {
                    path: change.path.clone(),
                    hash: response.current_hash,
                    size: bytes.len() as u64,
                    last_modified: Utc::now(),
                }
            }
            _ => self.remote.create(&change.path, &bytes).await?,
        };
        self.local_state.mark_synced(&change.path, Some(metadata));
        Ok(())
    }
}

async fn read_if_exists(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionRule;
    use crate::remote::{ApplyDiffResponse, DiffResponse, RemoteError};
    use parking_lot::Mutex;

    /// Server double holding files in memory, no permission checks.
    struct MemoryRemote {
        identity: String,
        files: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryRemote {
        fn new(identity: &str) -> Self {
            Self {
                identity: identity.to_string(),
                files: Mutex::new(BTreeMap::new()),
            }
        }

        fn put(&self, path: &str, bytes: &[u8]) {
            self.files.lock().insert(path.to_string(), bytes.to_vec());
        }

        fn get(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().get(path).cloned()
        }

        fn read(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
            self.get(path)
                .ok_or_else(|| RemoteError::NotFound(path.to_string()))
        }
    }

    #[async_trait::async_trait]
    impl SyncRemote for MemoryRemote {
        fn identity(&self) -> &str {
            &self.identity
        }

        async fn datasite_states(
            &self,
        ) -> Result<BTreeMap<String, Vec<FileMetadata>>, RemoteError> {
            unimplemented!()
        }

        async fn dir_state(&self, _dir: &str) -> Result<Vec<FileMetadata>, RemoteError> {
            unimplemented!()
        }

        async fn metadata(&self, path: &str) -> Result<FileMetadata, RemoteError> {
            Ok(FileMetadata::from_bytes(path, &self.read(path)?))
        }

        async fn get_diff(&self, path: &str, signature: &[u8]) -> Result<DiffResponse, RemoteError> {
            let bytes = self.read(path)?;
            let diff = delta::diff(signature, &bytes)
                .map_err(|e| RemoteError::BadRequest(e.to_string()))?;
            Ok(DiffResponse {
                path: path.to_string(),
                diff,
                hash: hash_bytes(&bytes),
            })
        }

        async fn signature(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
            Ok(delta::signature(&self.read(path)?))
        }

        async fn apply_diff(
            &self,
            path: &str,
            diff: &[u8],
            expected_hash: &str,
        ) -> Result<ApplyDiffResponse, RemoteError> {
            let base = self.read(path)?;
            let bytes =
                delta::apply(&base, diff).map_err(|e| RemoteError::BadRequest(e.to_string()))?;
            let current_hash = hash_bytes(&bytes);
            if current_hash != expected_hash {
                return Err(RemoteError::HashMismatch(path.to_string()));
            }
            self.put(path, &bytes);
            Ok(ApplyDiffResponse {
                path: path.to_string(),
                current_hash,
                previous_hash: hash_bytes(&base),
            })
        }

        async fn create(&self, path: &str, data: &[u8]) -> Result<FileMetadata, RemoteError> {
            self.put(path, data);
            Ok(FileMetadata::from_bytes(path, data))
        }

        async fn delete(&self, path: &str) -> Result<(), RemoteError> {
            self.files.lock().remove(path);
            Ok(())
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
            self.read(path)
        }

        async fn download_bulk(&self, _paths: &[String]) -> Result<Vec<u8>, RemoteError> {
            unimplemented!()
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        root: PathBuf,
        remote: Arc<MemoryRemote>,
        queue: Arc<SyncQueue>,
        state: Arc<LocalSyncState>,
        consumer: SyncConsumer,
    }

    fn fixture(identity: &str) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        let remote = Arc::new(MemoryRemote::new(identity));
        let queue = Arc::new(SyncQueue::new());
        let state = Arc::new(LocalSyncState::in_memory());
        let consumer = SyncConsumer::new(remote.clone(), &root, queue.clone(), state.clone());
        Fixture {
            _temp: temp,
            root,
            remote,
            queue,
            state,
            consumer,
        }
    }

    fn pull(kind: FileChangeKind, path: &str, local: Option<&[u8]>, remote: Option<&[u8]>) -> FileChangeInfo {
        FileChangeInfo {
            kind,
            path: path.to_string(),
            side: SyncSide::Local,
            local_hash: local.map(hash_bytes),
            remote_hash: remote.map(hash_bytes),
            size: remote.map(|b| b.len() as u64).unwrap_or(0),
        }
    }

    fn push(kind: FileChangeKind, path: &str, local: Option<&[u8]>, remote: Option<&[u8]>) -> FileChangeInfo {
        pull(kind, path, local, remote).reverse(local.map(|b| b.len() as u64).unwrap_or(0))
    }

    #[tokio::test]
    async fn test_pull_create_and_write() {
        let f = fixture("me@x.org");
        let path = "bob@x.org/notes.txt";
        let v1 = b"hello world".repeat(1000);
        f.remote.put(path, &v1);

        f.queue
            .enqueue(pull(FileChangeKind::Create, path, None, Some(&v1)));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(report.applied, 1);
        let fs_path = sync_path::to_fs_path(&f.root, path);
        assert_eq!(std::fs::read(&fs_path).unwrap(), v1);

        let mut v2 = v1.clone();
        v2.extend_from_slice(b"appended");
        f.remote.put(path, &v2);
        f.queue
            .enqueue(pull(FileChangeKind::Write, path, Some(&v1), Some(&v2)));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(report.applied, 1);
        assert_eq!(std::fs::read(&fs_path).unwrap(), v2);
        assert_eq!(f.state.synced_hash(path), Some(hash_bytes(&v2)));
    }

    #[tokio::test]
    async fn test_pull_hash_mismatch_leaves_file() {
        let f = fixture("me@x.org");
        let path = "bob@x.org/f";
        let fs_path = sync_path::to_fs_path(&f.root, path);
        write_atomic(&fs_path, b"old").unwrap();

        // server moved on since the snapshot
        f.remote.put(path, b"newer");
        f.queue
            .enqueue(pull(FileChangeKind::Write, path, Some(b"old"), Some(b"new")));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(std::fs::read(&fs_path).unwrap(), b"old");
        assert_eq!(f.state.status(path).unwrap().status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_pull_invalid_permission_file_rejected() {
        let f = fixture("me@x.org");
        let path = "bob@x.org/_.syftperm";
        f.remote.put(path, b"not json");
        f.queue
            .enqueue(pull(FileChangeKind::Create, path, None, Some(b"not json")));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;

        assert_eq!(report.rejected, 1);
        assert!(!sync_path::to_fs_path(&f.root, path).exists());
    }

    #[tokio::test]
    async fn test_pull_delete_is_idempotent() {
        let f = fixture("me@x.org");
        let path = "bob@x.org/gone";
        let fs_path = sync_path::to_fs_path(&f.root, path);
        write_atomic(&fs_path, b"x").unwrap();

        f.queue
            .enqueue(pull(FileChangeKind::Delete, path, Some(b"x"), None));
        f.consumer.consume_all(&BTreeMap::new()).await;
        assert!(!fs_path.exists());

        // a second delete sees no local file, which matches a None local hash
        f.queue
            .enqueue(pull(FileChangeKind::Delete, path, None, None));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(report.applied, 1);
    }

    #[tokio::test]
    async fn test_stale_pull_is_skipped() {
        let f = fixture("me@x.org");
        let path = "bob@x.org/f";
        let fs_path = sync_path::to_fs_path(&f.root, path);
        write_atomic(&fs_path, b"edited after snapshot").unwrap();
        f.remote.put(path, b"remote");

        f.queue
            .enqueue(pull(FileChangeKind::Write, path, Some(b"snapshot"), Some(b"remote")));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(std::fs::read(&fs_path).unwrap(), b"edited after snapshot");
    }

    #[tokio::test]
    async fn test_push_own_datasite() {
        let f = fixture("me@x.org");
        let path = "me@x.org/doc.txt";
        let fs_path = sync_path::to_fs_path(&f.root, path);
        let v1 = b"0123456789".repeat(2000);
        write_atomic(&fs_path, &v1).unwrap();

        f.queue
            .enqueue(push(FileChangeKind::Delete, path, Some(&v1), None));
        f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(f.remote.get(path), Some(v1.clone()));

        let mut v2 = v1.clone();
        v2[5000] = b'x';
        write_atomic(&fs_path, &v2).unwrap();
        f.queue
            .enqueue(push(FileChangeKind::Write, path, Some(&v2), Some(&v1)));
        let report = f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(report.applied, 1);
        assert_eq!(f.remote.get(path), Some(v2.clone()));

        std::fs::remove_file(&fs_path).unwrap();
        f.queue
            .enqueue(push(FileChangeKind::Create, path, None, Some(&v2)));
        f.consumer.consume_all(&BTreeMap::new()).await;
        assert_eq!(f.remote.get(path), None);
        assert_eq!(f.state.synced(path), None);
    }

    #[tokio::test]
    async fn test_push_denied_before_any_bytes_are_sent() {
        let f = fixture("alice@x.org");
        let owner = "ds@x.org";
        let mut tree = PermissionTree::new();
        tree.insert(
            "ds@x.org/shared",
            PermissionRule::owner_only(owner).with_write("alice@x.org"),
        );
        tree.insert("ds@x.org/shared/private", PermissionRule::owner_only(owner));
        let trees = BTreeMap::from([(owner.to_string(), tree)]);

        let private = "ds@x.org/shared/private/x";
        write_atomic(&sync_path::to_fs_path(&f.root, private), b"secret").unwrap();
        f.remote.put(private, b"original");
        f.queue.enqueue(push(
            FileChangeKind::Write,
            private,
            Some(b"secret"),
            Some(b"original"),
        ));

        let shared = "ds@x.org/shared/y";
        write_atomic(&sync_path::to_fs_path(&f.root, shared), b"ok").unwrap();
        f.queue
            .enqueue(push(FileChangeKind::Delete, shared, Some(b"ok"), None));

        let report = f.consumer.consume_all(&trees).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(f.remote.get(private), Some(b"original".to_vec()));
        assert_eq!(f.remote.get(shared), Some(b"ok".to_vec()));

        let status = f.state.status(private).unwrap();
        assert_eq!(status.status, SyncStatus::Rejected);
        assert_eq!(status.hash, Some(hash_bytes(b"secret")));
    }

    #[tokio::test]
    async fn test_permission_file_push_needs_admin() {
        let f = fixture("alice@x.org");
        let mut tree = PermissionTree::new();
        tree.insert(
            "ds@x.org",
            PermissionRule::owner_only("ds@x.org").with_write("alice@x.org"),
        );
        let trees = BTreeMap::from([("ds@x.org".to_string(), tree)]);

        let path = "ds@x.org/sub/_.syftperm";
        let rule = PermissionRule::public_read("alice@x.org").to_bytes();
        write_atomic(&sync_path::to_fs_path(&f.root, path), &rule).unwrap();
        f.queue
            .enqueue(push(FileChangeKind::Delete, path, Some(&rule), None));

        let report = f.consumer.consume_all(&trees).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(f.remote.get(path), None);
    }
}
