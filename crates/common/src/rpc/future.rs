use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{
    RpcError, SyftResponse, SyftStatus, SyftUrl, REJECTED_SUFFIX, REQUEST_EXTENSION,
    RESPONSE_EXTENSION,
};
use crate::atomic_write::{remove_if_exists, write_atomic};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_BULK_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Consecutive resolve errors after which a bulk member is answered with a
/// server error.
pub const MAX_RESOLVE_ERRORS: u32 = 5;

fn validate(timeout: Option<Duration>, poll_interval: Duration) -> Result<(), RpcError> {
    if timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(RpcError::InvalidArgument(
            "timeout must be greater than zero".to_string(),
        ));
    }
    if poll_interval.is_zero() {
        return Err(RpcError::InvalidArgument(
            "poll interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Handle on a sent request, resolved by looking at the files next to it.
///
/// Once resolved the result is kept on the future: resolving again returns
/// the same response without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyftFuture {
    pub id: Uuid,
    pub url: SyftUrl,
    /// Directory holding the request and response files.
    pub local_path: PathBuf,
    pub expires: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<SyftResponse>,
}

impl SyftFuture {
    pub fn new(id: Uuid, url: SyftUrl, local_path: PathBuf, expires: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            local_path,
            expires,
            result: None,
        }
    }

    pub fn request_path(&self) -> PathBuf {
        self.local_path
            .join(format!("{}.{}", self.id, REQUEST_EXTENSION))
    }

    pub fn response_path(&self) -> PathBuf {
        self.local_path
            .join(format!("{}.{}", self.id, RESPONSE_EXTENSION))
    }

    pub fn rejected_path(&self) -> PathBuf {
        self.local_path
            .join(format!("{}.{}.{}", self.id, REJECTED_SUFFIX, REQUEST_EXTENSION))
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_path().exists()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    /// The terminal result, if the future has already been resolved.
    pub fn result(&self) -> Option<&SyftResponse> {
        self.result.as_ref()
    }

    /// Check once for a terminal state. `Ok(None)` means still pending.
    ///
    /// Never sleeps. Rejections, expiry and unreadable responses come back
    /// as synthesized responses rather than errors.
    pub fn resolve(&mut self) -> Result<Option<SyftResponse>, RpcError> {
        if let Some(result) = &self.result {
            return Ok(Some(result.clone()));
        }

        let response = if self.is_rejected() {
            self.cleanup(&[self.request_path(), self.rejected_path()]);
            self.system(
                SyftStatus::Forbidden,
                "request was rejected by the recipient or the server due to permissions",
            )
        } else if let Some(bytes) = read_if_exists(&self.response_path())? {
            let response = match SyftResponse::from_bytes(&bytes) {
                Ok(mut response) => {
                    // keep the body, flag the staleness
                    if response.is_expired() {
                        response.status_code = SyftStatus::Expired;
                    }
                    response
                }
                Err(e) => {
                    tracing::error!(id = %self.id, "unreadable response: {}", e);
                    self.system(SyftStatus::ServerError, &e.to_string())
                }
            };
            self.cleanup(&[self.request_path(), self.response_path()]);
            response
        } else if !self.request_path().exists() {
            self.system(
                SyftStatus::NotFound,
                &format!("request {} not found", self.id),
            )
        } else if self.is_expired() {
            self.cleanup(&[self.request_path(), self.response_path()]);
            self.system(
                SyftStatus::Expired,
                &format!("request {} expired on {}", self.id, self.expires),
            )
        } else {
            return Ok(None);
        };

        self.result = Some(response.clone());
        Ok(Some(response))
    }

    /// Poll [`resolve`](Self::resolve) every `poll_interval` until it
    /// returns a response or `timeout` elapses. Without a timeout this waits
    /// until the request itself expires.
    ///
    /// Timing out leaves the files in place; the future can be waited on
    /// again later.
    pub async fn wait(
        &mut self,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> Result<SyftResponse, RpcError> {
        validate(timeout, poll_interval)?;
        match timeout {
            Some(timeout) => timeout_at(Instant::now() + timeout, self.poll(poll_interval))
                .await
                .map_err(|_| RpcError::Timeout(timeout))?,
            None => self.poll(poll_interval).await,
        }
    }

    async fn poll(&mut self, poll_interval: Duration) -> Result<SyftResponse, RpcError> {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(response) = self.resolve()? {
                return Ok(response);
            }
        }
    }

    /// Settle the future with a server error, e.g. after its files kept
    /// failing to read.
    fn fail(&mut self, message: &str) -> SyftResponse {
        let response = self.system(SyftStatus::ServerError, message);
        self.result = Some(response.clone());
        response
    }

    fn system(&self, status: SyftStatus, message: &str) -> SyftResponse {
        SyftResponse::system(self.id, self.url.clone(), status, message)
    }

    fn cleanup(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = remove_if_exists(path) {
                tracing::warn!(id = %self.id, path = %path.display(), "failed to remove rpc file: {}", e);
            }
        }
    }
}

/// A set of futures resolved together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyftBulkFuture {
    pub futures: Vec<SyftFuture>,
    #[serde(default)]
    pub responses: Vec<SyftResponse>,
}

impl SyftBulkFuture {
    pub fn new(futures: Vec<SyftFuture>) -> Self {
        Self {
            futures,
            responses: Vec::new(),
        }
    }

    /// Derived from the member ids, independent of their order.
    pub fn id(&self) -> Uuid {
        let ids: BTreeSet<String> = self.futures.iter().map(|f| f.id.to_string()).collect();
        let combined = ids.into_iter().collect::<Vec<_>>().join(",");
        let digest = Sha256::digest(combined.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Resolve members until all are done or `timeout` elapses, then return
    /// whatever completed. Running out of time is not an error. A member
    /// whose files fail to read [`MAX_RESOLVE_ERRORS`] times in a row is
    /// answered with a server error.
    pub async fn gather_completed(
        &mut self,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> Result<&[SyftResponse], RpcError> {
        validate(timeout, poll_interval)?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut pending: Vec<usize> = (0..self.futures.len())
            .filter(|&index| {
                let id = self.futures[index].id;
                !self.responses.iter().any(|response| response.id == id)
            })
            .collect();
        let mut errors = vec![0u32; self.futures.len()];
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !pending.is_empty() {
            ticker.tick().await;
            let mut still_pending = Vec::with_capacity(pending.len());
            for index in pending {
                let future = &mut self.futures[index];
                match future.resolve() {
                    Ok(Some(response)) => self.responses.push(response),
                    Ok(None) => {
                        errors[index] = 0;
                        still_pending.push(index);
                    }
                    Err(e) => {
                        errors[index] += 1;
                        if errors[index] >= MAX_RESOLVE_ERRORS {
                            tracing::error!(id = %future.id, "giving up on future: {}", e);
                            self.responses.push(future.fail(&e.to_string()));
                        } else {
                            tracing::warn!(id = %future.id, "failed to resolve future: {}", e);
                            still_pending.push(index);
                        }
                    }
                }
            }
            pending = still_pending;

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }

        Ok(&self.responses)
    }

    pub fn successes(&self) -> impl Iterator<Item = &SyftResponse> {
        self.responses.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyftResponse> {
        self.responses.iter().filter(|r| !r.is_success())
    }
}

/// Futures persisted across processes, one JSON file each.
#[derive(Debug, Clone)]
pub struct FutureStore {
    dir: PathBuf,
}

impl FutureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, future: &SyftFuture) -> Result<(), RpcError> {
        let bytes = serde_json::to_vec_pretty(future)?;
        write_atomic(&self.path_for(&future.id), &bytes)?;
        Ok(())
    }

    pub fn load(&self, id: &Uuid) -> Result<SyftFuture, RpcError> {
        let bytes = read_if_exists(&self.path_for(id))?.ok_or(RpcError::FutureNotFound(*id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn remove(&self, id: &Uuid) -> Result<(), RpcError> {
        remove_if_exists(&self.path_for(id))?;
        Ok(())
    }

    /// Every stored future, unreadable entries skipped.
    pub fn list(&self) -> Result<Vec<SyftFuture>, RpcError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut futures = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path)
                .map_err(RpcError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<SyftFuture>(&bytes)?))
            {
                Ok(future) => futures.push(future),
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable future: {}", e),
            }
        }
        futures.sort_by_key(|future| future.expires);
        Ok(futures)
    }
}

fn read_if_exists(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
