use std::collections::BTreeMap;

use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::state::FileMetadata;

use super::{Identity, SyncApiError};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasiteStatesRequest {}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(identity): Identity,
) -> Result<impl IntoResponse, SyncApiError> {
    let states = state.sync().datasite_states(&identity).await?;
    tracing::debug!(identity = %identity, datasites = states.len(), "served datasite states");
    Ok((http::StatusCode::OK, Json(states)))
}

impl ApiRequest for DatasiteStatesRequest {
    type Response = BTreeMap<String, Vec<FileMetadata>>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/sync/datasite_states")?;
        Ok(client.post(full_url).json(&self))
    }
}
