use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<DeleteRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    state.sync().delete(&identity, &req.path).await?;
    Ok((http::StatusCode::OK, Json(DeleteResponse { path: req.path })))
}

impl ApiRequest for DeleteRequest {
    type Response = DeleteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/delete")?;
        Ok(client.post(full_url).json(&self))
    }
}
