use axum::extract::{Json, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use common::state::FileMetadata;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<CreateRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let meta = state
        .sync()
        .create(&identity, &req.path, Bytes::from(req.data))
        .await?;
    Ok((http::StatusCode::OK, Json(meta)))
}

impl ApiRequest for CreateRequest {
    type Response = FileMetadata;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/create")?;
        Ok(client.post(full_url).json(&self))
    }
}
