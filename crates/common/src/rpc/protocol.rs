use std::path::{Path, PathBuf};

use super::{
    RpcError, SyftFuture, SyftRequest, SyftResponse, SyftStatus, SyftUrl, REJECTED_SUFFIX,
    REQUEST_EXTENSION, RESPONSE_EXTENSION,
};
use crate::atomic_write::write_atomic;

/// Both ends of the file based request/response exchange, rooted at a
/// local datasites directory. Delivery is left to the sync loop.
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    datasites: PathBuf,
    identity: String,
}

impl RpcEndpoint {
    pub fn new(datasites: impl Into<PathBuf>, identity: &str) -> Self {
        Self {
            datasites: datasites.into(),
            identity: identity.to_string(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn datasites(&self) -> &Path {
        &self.datasites
    }

    fn dir_for(&self, url: &SyftUrl) -> PathBuf {
        url.to_local_path(&self.datasites)
    }

    /// Write `request` as `<id>.request` below its url.
    ///
    /// An identical request that is still pending is reused rather than
    /// rewritten, so retries keep the original expiry.
    pub fn send(&self, request: &SyftRequest) -> Result<SyftFuture, RpcError> {
        if request.sender != self.identity {
            return Err(RpcError::InvalidArgument(format!(
                "request sender {} does not match {}",
                request.sender, self.identity
            )));
        }

        let dir = self.dir_for(&request.url);
        let path = dir.join(format!("{}.{}", request.id, REQUEST_EXTENSION));

        let existing = std::fs::read(&path)
            .ok()
            .and_then(|bytes| SyftRequest::from_bytes(&bytes).ok())
            .filter(|existing| existing.id == request.id && !existing.is_expired());

        let expires = match existing {
            Some(existing) => {
                tracing::debug!(id = %request.id, url = %request.url, "request already pending");
                existing.expires
            }
            None => {
                write_atomic(&path, &request.to_bytes()?)?;
                tracing::debug!(id = %request.id, url = %request.url, "request sent");
                request.expires
            }
        };

        Ok(SyftFuture::new(request.id, request.url.clone(), dir, expires))
    }

    /// Answer `request` by writing `<id>.response` next to it.
    pub fn reply_to(
        &self,
        request: &SyftRequest,
        status: SyftStatus,
        body: Option<Vec<u8>>,
    ) -> Result<SyftResponse, RpcError> {
        let mut response = SyftResponse::for_request(request, &self.identity, status);
        response.body = body;

        let path = self
            .dir_for(&request.url)
            .join(format!("{}.{}", request.id, RESPONSE_EXTENSION));
        write_atomic(&path, &response.to_bytes()?)?;
        tracing::debug!(id = %request.id, status = %status, "request answered");
        Ok(response)
    }

    /// Refuse `request` by dropping a rejection marker next to it.
    pub fn reject(&self, request: &SyftRequest) -> Result<(), RpcError> {
        let path = self.dir_for(&request.url).join(format!(
            "{}.{}.{}",
            request.id, REJECTED_SUFFIX, REQUEST_EXTENSION
        ));
        write_atomic(&path, b"")?;
        tracing::debug!(id = %request.id, "request rejected");
        Ok(())
    }

    /// Unexpired requests below `url` that have neither a response nor a
    /// rejection yet, oldest first.
    pub fn pending_requests(&self, url: &SyftUrl) -> Result<Vec<SyftRequest>, RpcError> {
        let dir = self.dir_for(url);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let request_suffix = format!(".{}", REQUEST_EXTENSION);
        let rejected_suffix = format!(".{}.{}", REJECTED_SUFFIX, REQUEST_EXTENSION);

        let mut requests = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(&request_suffix) || name.ends_with(&rejected_suffix) {
                continue;
            }

            let request = match std::fs::read(entry.path())
                .map_err(RpcError::from)
                .and_then(|bytes| SyftRequest::from_bytes(&bytes))
            {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(file = %name, "skipping unreadable request: {}", e);
                    continue;
                }
            };

            let answered = dir
                .join(format!("{}.{}", request.id, RESPONSE_EXTENSION))
                .exists();
            let rejected = dir
                .join(format!("{}{}", request.id, rejected_suffix))
                .exists();
            if !answered && !rejected && !request.is_expired() {
                requests.push(request);
            }
        }

        requests.sort_by_key(|request| request.created);
        Ok(requests)
    }
}
