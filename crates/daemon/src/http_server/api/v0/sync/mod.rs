//! Sync endpoints. Every request names the caller in the
//! `x-syncbox-identity` header and every answer is filtered or refused
//! according to the permission files of the datasite it touches.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::request::Parts;
use http::StatusCode;

use common::remote::RemoteError;
use file_store::ServiceError;

use crate::ServiceState;

pub mod apply_diff;
pub mod create;
pub mod datasite_states;
pub mod delete;
pub mod dir_state;
pub mod download;
pub mod download_bulk;
pub mod get_diff;
pub mod get_metadata;
pub mod signature;

pub const IDENTITY_HEADER: &str = "x-syncbox-identity";

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/get_diff", post(get_diff::handler))
        .route("/apply_diff", post(apply_diff::handler))
        .route("/signature", post(signature::handler))
        .route("/get_metadata", post(get_metadata::handler))
        .route("/dir_state", post(dir_state::handler))
        .route("/datasite_states", post(datasite_states::handler))
        .route("/create", post(create::handler))
        .route("/delete", post(delete::handler))
        .route("/download", post(download::handler))
        .route("/download_bulk", post(download_bulk::handler))
        .with_state(state)
}

/// Caller identity taken from [`IDENTITY_HEADER`].
#[derive(Debug, Clone)]
pub struct Identity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = SyncApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if value.is_empty() || value.contains('/') {
            return Err(SyncApiError(RemoteError::BadRequest(format!(
                "missing or invalid {} header",
                IDENTITY_HEADER
            ))));
        }
        Ok(Identity(value.to_string()))
    }
}

/// Error shared by the sync endpoints, answered as an
/// [`ErrorBody`](common::remote::ErrorBody) the client maps back.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct SyncApiError(pub RemoteError);

impl From<ServiceError> for SyncApiError {
    fn from(err: ServiceError) -> Self {
        SyncApiError(err.into())
    }
}

impl IntoResponse for SyncApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RemoteError::NotFound(_) => StatusCode::NOT_FOUND,
            RemoteError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            RemoteError::HashMismatch(_)
            | RemoteError::InvalidPermissionFile(_)
            | RemoteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RemoteError::Transport(_) => StatusCode::BAD_GATEWAY,
            RemoteError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("sync request failed: {}", self.0);
        } else {
            tracing::debug!(code = self.0.code(), "sync request refused: {}", self.0);
        }
        (status, Json(self.0.to_body())).into_response()
    }
}
