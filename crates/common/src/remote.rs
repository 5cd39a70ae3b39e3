//! The sync server as seen from a client.
//!
//! [`SyncRemote`] is the transport seam: the HTTP client implements it for
//! real deployments and the file store crate implements it in-process for
//! tests. Every call is made on behalf of one identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::state::FileMetadata;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub diff: Vec<u8>,
    /// Hash of the content the diff reconstructs.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyDiffResponse {
    pub path: String,
    pub current_hash: String,
    pub previous_hash: String,
}

/// Machine readable error body returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("hash mismatch, skipped writing: {0}")]
    HashMismatch(String),
    #[error("invalid permission file: {0}")]
    InvalidPermissionFile(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error: {0}")]
    Server(String),
}

impl RemoteError {
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::NotFound(_) => "not_found",
            RemoteError::PermissionDenied(_) => "permission_denied",
            RemoteError::HashMismatch(_) => "hash_mismatch",
            RemoteError::InvalidPermissionFile(_) => "invalid_permission_file",
            RemoteError::BadRequest(_) => "bad_request",
            RemoteError::Transport(_) => "transport",
            RemoteError::Server(_) => "server",
        }
    }

    fn message(&self) -> &str {
        match self {
            RemoteError::NotFound(m)
            | RemoteError::PermissionDenied(m)
            | RemoteError::HashMismatch(m)
            | RemoteError::InvalidPermissionFile(m)
            | RemoteError::BadRequest(m)
            | RemoteError::Transport(m)
            | RemoteError::Server(m) => m,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.message().to_string(),
        }
    }

    pub fn from_body(body: ErrorBody) -> Self {
        let ErrorBody { code, message } = body;
        match code.as_str() {
            "not_found" => RemoteError::NotFound(message),
            "permission_denied" => RemoteError::PermissionDenied(message),
            "hash_mismatch" => RemoteError::HashMismatch(message),
            "invalid_permission_file" => RemoteError::InvalidPermissionFile(message),
            "bad_request" => RemoteError::BadRequest(message),
            "transport" => RemoteError::Transport(message),
            _ => RemoteError::Server(message),
        }
    }

    /// Worth retrying on a later iteration without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Server(_))
    }
}

#[async_trait::async_trait]
pub trait SyncRemote: Send + Sync {
    /// Identity every request is made as.
    fn identity(&self) -> &str;

    /// Readable metadata of every datasite, keyed by datasite.
    async fn datasite_states(&self) -> Result<BTreeMap<String, Vec<FileMetadata>>, RemoteError>;

    /// Readable metadata below `dir`.
    async fn dir_state(&self, dir: &str) -> Result<Vec<FileMetadata>, RemoteError>;

    async fn metadata(&self, path: &str) -> Result<FileMetadata, RemoteError>;

    /// Diff of the current content against the caller's `signature`.
    async fn get_diff(&self, path: &str, signature: &[u8]) -> Result<DiffResponse, RemoteError>;

    /// Signature of the current content, for pushing a diff.
    async fn signature(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    async fn apply_diff(
        &self,
        path: &str,
        diff: &[u8],
        expected_hash: &str,
    ) -> Result<ApplyDiffResponse, RemoteError>;

    async fn create(&self, path: &str, data: &[u8]) -> Result<FileMetadata, RemoteError>;

    /// Idempotent.
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Zip archive of the readable subset of `paths`.
    async fn download_bulk(&self, paths: &[String]) -> Result<Vec<u8>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_round_trip() {
        let errors = vec![
            RemoteError::NotFound("a".into()),
            RemoteError::PermissionDenied("b".into()),
            RemoteError::HashMismatch("c".into()),
            RemoteError::InvalidPermissionFile("d".into()),
            RemoteError::BadRequest("e".into()),
        ];
        for error in errors {
            assert_eq!(RemoteError::from_body(error.to_body()), error);
        }
        assert!(matches!(
            RemoteError::from_body(ErrorBody {
                code: "weird".into(),
                message: "x".into()
            }),
            RemoteError::Server(_)
        ));
    }

    #[test]
    fn test_diff_response_base64() {
        let response = DiffResponse {
            path: "a@x.org/f".into(),
            diff: vec![0, 1, 2, 255],
            hash: "h".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["diff"], "AAEC/w==");
        let back: DiffResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }
}
