use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use common::remote::ApplyDiffResponse;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDiffRequest {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub diff: Vec<u8>,
    /// Hash the patched content must have to be stored
    pub expected_hash: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<ApplyDiffRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let applied = state
        .sync()
        .apply_diff(&identity, &req.path, &req.diff, &req.expected_hash)
        .await?;
    Ok((http::StatusCode::OK, Json(applied)))
}

impl ApiRequest for ApplyDiffRequest {
    type Response = ApplyDiffResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/apply_diff")?;
        Ok(client.post(full_url).json(&self))
    }
}
