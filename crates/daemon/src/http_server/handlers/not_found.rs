use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::remote::ErrorBody;

/// Unknown routes answer in the shape sync clients parse for errors.
pub async fn not_found_handler(uri: Uri, headers: HeaderMap) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let message = format!("no route for {}", uri.path());

    match accept {
        Some(accept_str) if accept_str.contains("application/json") => {
            let body = ErrorBody {
                code: "not_found".to_string(),
                message,
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            message,
        )
            .into_response(),
    }
}
