use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use common::remote::DiffResponse;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDiffRequest {
    pub path: String,
    /// Signature of the caller's copy
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<GetDiffRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let diff = state
        .sync()
        .get_diff(&identity, &req.path, &req.signature)
        .await?;
    Ok((http::StatusCode::OK, Json(diff)))
}

impl ApiRequest for GetDiffRequest {
    type Response = DiffResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/get_diff")?;
        Ok(client.post(full_url).json(&self))
    }
}
