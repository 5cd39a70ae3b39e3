use reqwest::StatusCode;

use common::remote::{ErrorBody, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Reqwest(e) if e.is_decode() => RemoteError::Server(e.to_string()),
            ApiError::Reqwest(e) => RemoteError::Transport(e.to_string()),
            ApiError::UrlParse(e) => RemoteError::BadRequest(e.to_string()),
            ApiError::HttpStatus(status, text) => match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => RemoteError::from_body(body),
                Err(_) => match status {
                    StatusCode::NOT_FOUND => RemoteError::NotFound(text),
                    StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                        RemoteError::PermissionDenied(text)
                    }
                    s if s.is_client_error() => RemoteError::BadRequest(text),
                    _ => RemoteError::Server(text),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_wins_over_status() {
        let body = serde_json::to_string(&RemoteError::HashMismatch("a@x.org/f".into()).to_body())
            .unwrap();
        let err: RemoteError = ApiError::HttpStatus(StatusCode::BAD_REQUEST, body).into();
        assert_eq!(err, RemoteError::HashMismatch("a@x.org/f".into()));
    }

    #[test]
    fn test_plain_text_falls_back_to_status() {
        let err: RemoteError =
            ApiError::HttpStatus(StatusCode::NOT_FOUND, "nope".into()).into();
        assert_eq!(err, RemoteError::NotFound("nope".into()));

        let err: RemoteError =
            ApiError::HttpStatus(StatusCode::BAD_GATEWAY, "proxy".into()).into();
        assert!(err.is_transient());
    }
}
