use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub path: String,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<DownloadRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let data = state.sync().download(&identity, &req.path).await?;
    Ok((
        http::StatusCode::OK,
        Json(DownloadResponse {
            path: req.path,
            data: data.to_vec(),
        }),
    ))
}

impl ApiRequest for DownloadRequest {
    type Response = DownloadResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/download")?;
        Ok(client.post(full_url).json(&self))
    }
}
