use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub path: String,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<SignatureRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let signature = state.sync().signature(&identity, &req.path).await?;
    Ok((
        http::StatusCode::OK,
        Json(SignatureResponse {
            path: req.path,
            signature,
        }),
    ))
}

impl ApiRequest for SignatureRequest {
    type Response = SignatureResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/signature")?;
        Ok(client.post(full_url).json(&self))
    }
}
