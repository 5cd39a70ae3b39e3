use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::state::FileMetadata;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMetadataRequest {
    pub path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<GetMetadataRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let meta = state.sync().metadata(&identity, &req.path).await?;
    Ok((http::StatusCode::OK, Json(meta)))
}

impl ApiRequest for GetMetadataRequest {
    type Response = FileMetadata;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/get_metadata")?;
        Ok(client.post(full_url).json(&self))
    }
}
