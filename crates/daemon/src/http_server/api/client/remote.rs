use std::collections::BTreeMap;

use common::remote::{ApplyDiffResponse, DiffResponse, RemoteError, SyncRemote};
use common::state::FileMetadata;

use super::{ApiClient, ApiError};
use crate::http_server::api::v0::sync::{
    apply_diff::ApplyDiffRequest, create::CreateRequest, datasite_states::DatasiteStatesRequest,
    delete::DeleteRequest, dir_state::DirStateRequest, download::DownloadRequest,
    download_bulk::DownloadBulkRequest, get_diff::GetDiffRequest,
    get_metadata::GetMetadataRequest, signature::SignatureRequest,
};

/// The sync server reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: ApiClient,
    identity: String,
}

impl HttpRemote {
    pub fn new(server_url: &url::Url, identity: impl Into<String>) -> Result<Self, ApiError> {
        let identity = identity.into();
        let client = ApiClient::with_identity(server_url, &identity)?;
        Ok(Self { client, identity })
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl SyncRemote for HttpRemote {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn datasite_states(&self) -> Result<BTreeMap<String, Vec<FileMetadata>>, RemoteError> {
        Ok(self.client.call(DatasiteStatesRequest {}).await?)
    }

    async fn dir_state(&self, dir: &str) -> Result<Vec<FileMetadata>, RemoteError> {
        Ok(self
            .client
            .call(DirStateRequest {
                dir: dir.to_string(),
            })
            .await?)
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata, RemoteError> {
        Ok(self
            .client
            .call(GetMetadataRequest {
                path: path.to_string(),
            })
            .await?)
    }

    async fn get_diff(&self, path: &str, signature: &[u8]) -> Result<DiffResponse, RemoteError> {
        Ok(self
            .client
            .call(GetDiffRequest {
                path: path.to_string(),
                signature: signature.to_vec(),
            })
            .await?)
    }

    async fn signature(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self
            .client
            .call(SignatureRequest {
                path: path.to_string(),
            })
            .await?;
        Ok(response.signature)
    }

    async fn apply_diff(
        &self,
        path: &str,
        diff: &[u8],
        expected_hash: &str,
    ) -> Result<ApplyDiffResponse, RemoteError> {
        Ok(self
            .client
            .call(ApplyDiffRequest {
                path: path.to_string(),
                diff: diff.to_vec(),
                expected_hash: expected_hash.to_string(),
            })
            .await?)
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<FileMetadata, RemoteError> {
        Ok(self
            .client
            .call(CreateRequest {
                path: path.to_string(),
                data: data.to_vec(),
            })
            .await?)
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.client
            .call(DeleteRequest {
                path: path.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self
            .client
            .call(DownloadRequest {
                path: path.to_string(),
            })
            .await?;
        Ok(response.data)
    }

    async fn download_bulk(&self, paths: &[String]) -> Result<Vec<u8>, RemoteError> {
        let response = self
            .client
            .call(DownloadBulkRequest {
                paths: paths.to_vec(),
            })
            .await?;
        Ok(response.archive)
    }
}
