use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::timeout;

use super::data_source::*;

const READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// The file store answers, so sync requests can be served.
#[tracing::instrument]
pub async fn handler(data_src: StateDataSource) -> Response {
    match timeout(READINESS_TIMEOUT, data_src.is_ready()).await {
        Ok(Ok(())) => {
            let msg = serde_json::json!({"status": "ok"});
            (StatusCode::OK, Json(msg)).into_response()
        }
        Ok(Err(DataSourceError::DependencyFailure)) => {
            unavailable("file store is not available")
        }
        Ok(Err(DataSourceError::ShuttingDown)) => unavailable("service is shutting down"),
        Err(_) => unavailable("readiness check timed out"),
    }
}

fn unavailable(message: &str) -> Response {
    tracing::warn!("not ready: {}", message);
    let msg = serde_json::json!({"status": "failure", "message": message});
    (StatusCode::SERVICE_UNAVAILABLE, Json(msg)).into_response()
}
