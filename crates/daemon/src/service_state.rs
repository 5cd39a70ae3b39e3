use std::sync::Arc;

use file_store::{FileStore, FileStoreError, SyncService};

use crate::service_config::Config;

/// Shared state of the sync server.
#[derive(Clone)]
pub struct State {
    sync: Arc<SyncService>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup file store (sqlite metadata + object storage)
        let store = match config.sqlite_path {
            Some(ref path) => {
                tracing::info!(db = %path.display(), "opening file store");
                FileStore::new(path, config.storage.clone()).await?
            }
            // otherwise just set up an in-memory database
            None => {
                tracing::warn!("using an in-memory metadata database");
                FileStore::in_memory(config.storage.clone()).await?
            }
        };

        // 2. Wrap it in the permission enforcing service
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: FileStore) -> Self {
        Self {
            sync: Arc::new(SyncService::new(store)),
        }
    }

    pub fn sync(&self) -> &Arc<SyncService> {
        &self.sync
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to open file store: {0}")]
    FileStore(#[from] FileStoreError),
}
