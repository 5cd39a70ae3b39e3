use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::state::FileMetadata;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirStateRequest {
    /// Synced path of a directory, starting with its datasite
    pub dir: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
    Json(req): Json<DirStateRequest>,
) -> Result<impl IntoResponse, SyncApiError> {
    let files = state.sync().dir_state(&identity, &req.dir).await?;
    Ok((http::StatusCode::OK, Json(files)))
}

impl ApiRequest for DirStateRequest {
    type Response = Vec<FileMetadata>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/dir_state")?;
        Ok(client.post(full_url).json(&self))
    }
}
