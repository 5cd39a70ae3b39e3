//! In-process [`SyncRemote`] backed directly by a [`SyncService`].

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use common::remote::{ApplyDiffResponse, DiffResponse, RemoteError, SyncRemote};
use common::state::FileMetadata;

use crate::service::SyncService;

/// A client of `service` acting as `identity`, without any transport in
/// between.
#[derive(Debug, Clone)]
pub struct LocalRemote {
    service: Arc<SyncService>,
    identity: String,
}

impl LocalRemote {
    pub fn new(service: Arc<SyncService>, identity: impl Into<String>) -> Self {
        Self {
            service,
            identity: identity.into(),
        }
    }
}

#[async_trait::async_trait]
impl SyncRemote for LocalRemote {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn datasite_states(&self) -> Result<BTreeMap<String, Vec<FileMetadata>>, RemoteError> {
        Ok(self.service.datasite_states(&self.identity).await?)
    }

    async fn dir_state(&self, dir: &str) -> Result<Vec<FileMetadata>, RemoteError> {
        Ok(self.service.dir_state(&self.identity, dir).await?)
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata, RemoteError> {
        Ok(self.service.metadata(&self.identity, path).await?)
    }

    async fn get_diff(&self, path: &str, signature: &[u8]) -> Result<DiffResponse, RemoteError> {
        Ok(self.service.get_diff(&self.identity, path, signature).await?)
    }

    async fn signature(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        Ok(self.service.signature(&self.identity, path).await?)
    }

    async fn apply_diff(
        &self,
        path: &str,
        diff: &[u8],
        expected_hash: &str,
    ) -> Result<ApplyDiffResponse, RemoteError> {
        Ok(self
            .service
            .apply_diff(&self.identity, path, diff, expected_hash)
            .await?)
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<FileMetadata, RemoteError> {
        Ok(self
            .service
            .create(&self.identity, path, Bytes::copy_from_slice(data))
            .await?)
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        Ok(self.service.delete(&self.identity, path).await?)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        Ok(self.service.download(&self.identity, path).await?.to_vec())
    }

    async fn download_bulk(&self, paths: &[String]) -> Result<Vec<u8>, RemoteError> {
        Ok(self.service.download_bulk(&self.identity, paths).await?)
    }
}
