use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadBulkRequest {
    pub paths: Vec<String>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadBulkResponse {
    /// Zip archive, entries named by synced path
    #[serde_as(as = "Base64")]
    pub archive: Vec<u8>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<DownloadBulkRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let archive = state.sync().download_bulk(&identity, &req.paths).await?;
    Ok((http::StatusCode::OK, Json(DownloadBulkResponse { archive })))
}

impl ApiRequest for DownloadBulkRequest {
    type Response = DownloadBulkResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/download_bulk")?;
        Ok(client.post(full_url).json(&self))
    }
}
