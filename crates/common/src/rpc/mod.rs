//! Request/response messaging over the synced tree.
//!
//! A request is a file `<id>.request` written into the recipient's
//! datasite. The recipient answers with `<id>.response` or refuses with a
//! `<id>.syftrejected.request` marker, and the sync loop carries the files
//! back and forth. There is no other channel: a [`SyftFuture`] is resolved
//! purely from which of these files exist.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

mod future;
mod message;
mod protocol;
mod url;

pub use future::{
    FutureStore, SyftBulkFuture, SyftFuture, DEFAULT_BULK_POLL_INTERVAL, DEFAULT_POLL_INTERVAL,
    MAX_RESOLVE_ERRORS,
};
pub use message::{Headers, SyftMethod, SyftRequest, SyftResponse, SyftStatus, SYSTEM_SENDER};
pub use protocol::RpcEndpoint;
pub use url::SyftUrl;

/// Seconds a message stays valid unless told otherwise.
pub const DEFAULT_MESSAGE_EXPIRY: i64 = 60 * 60 * 24;

pub const REQUEST_EXTENSION: &str = "request";
pub const RESPONSE_EXTENSION: &str = "response";
pub const REJECTED_SUFFIX: &str = "syftrejected";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid syft url: {0}")]
    InvalidUrl(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("timed out after {0:?} waiting for a response")]
    Timeout(Duration),
    #[error("request failed with status {0}")]
    Status(SyftStatus),
    #[error("future not found: {0}")]
    FutureNotFound(Uuid),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse `30s`, `5m`, `24h` or `3d`.
pub fn parse_duration(value: &str) -> Result<chrono::Duration, RpcError> {
    let value = value.trim().to_ascii_lowercase();
    let invalid = || RpcError::InvalidDuration(value.clone());

    let (split, _) = value.char_indices().last().ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount = i64::from(amount.parse::<u32>().map_err(|_| invalid())?);
    let seconds = match unit {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 60 * 60,
        "d" => amount * 60 * 60 * 24,
        _ => return Err(invalid()),
    };
    chrono::Duration::try_seconds(seconds).ok_or_else(invalid)
}
