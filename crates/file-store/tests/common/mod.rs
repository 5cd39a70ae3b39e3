//! Shared fixtures: one in-memory server and any number of sync clients.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::local_state::LocalSyncState;
use common::permissions::PermissionRule;
use common::rpc::RpcEndpoint;
use common::sync::{ConsumeReport, SyncConfig, SyncManager};
use common::sync_path;
use file_store::{FileStore, LocalRemote, SyncService};
use tempfile::TempDir;

pub const ALICE: &str = "alice@openmined.org";
pub const BOB: &str = "bob@openmined.org";

pub async fn setup_server() -> Arc<SyncService> {
    let store = FileStore::new_ephemeral().await.unwrap();
    Arc::new(SyncService::new(store))
}

/// A client with its own sync folder talking to `server` in-process.
pub struct TestClient {
    pub temp: TempDir,
    pub identity: String,
    pub manager: SyncManager,
}

impl TestClient {
    pub fn new(server: &Arc<SyncService>, identity: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let datasites = temp.path().join("datasites");
        std::fs::create_dir_all(datasites.join(identity)).unwrap();

        let remote = Arc::new(LocalRemote::new(server.clone(), identity));
        let manager = SyncManager::new(
            remote,
            SyncConfig::new(&datasites),
            Arc::new(LocalSyncState::in_memory()),
        );
        Self {
            temp,
            identity: identity.to_string(),
            manager,
        }
    }

    pub fn datasites(&self) -> PathBuf {
        self.temp.path().join("datasites")
    }

    pub fn endpoint(&self) -> RpcEndpoint {
        RpcEndpoint::new(self.datasites(), &self.identity)
    }

    pub fn fs_path(&self, path: &str) -> PathBuf {
        sync_path::to_fs_path(&self.datasites(), path)
    }

    pub fn write(&self, path: &str, contents: &[u8]) {
        write_file(&self.fs_path(path), contents);
    }

    pub fn write_permissions(&self, dir: &str, rule: &PermissionRule) {
        self.write(&sync_path::join(dir, "_.syftperm"), &rule.to_bytes());
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.fs_path(path)).ok()
    }

    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.fs_path(path)).unwrap();
    }

    pub async fn sync(&self) -> ConsumeReport {
        self.manager.run_once().await.unwrap()
    }
}

pub fn write_file(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
