use std::time::Duration;

use clap::{Args, Subcommand};

pub mod pending;
pub mod reply;
pub mod send;
pub mod wait;

use common::rpc::{parse_duration, FutureStore, RpcEndpoint, RpcError, SyftFuture, SyftResponse};
use uuid::Uuid;
use syncbox_daemon::state::{AppState, StateError};

use crate::cli::op::Op;

crate::command_enum! {
    (Send, send::SendRequest),
    (Wait, wait::Wait),
    (Pending, pending::Pending),
    (Reply, reply::Reply),
}

pub type RpcCommand = Command;

/// Request/response messaging carried by the sync folder.
#[derive(Args, Debug, Clone)]
pub struct Rpc {
    #[command(subcommand)]
    pub command: RpcCommand,
}

#[async_trait::async_trait]
impl Op for Rpc {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcOpError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no response to {id} within {timeout:?}, resume with `syncbox rpc wait {id}`")]
    NoResponse { id: Uuid, timeout: Duration },
}

/// The configured identity's endpoint over its local sync folder.
fn endpoint(
    ctx: &crate::cli::op::OpContext,
) -> Result<(AppState, RpcEndpoint), RpcOpError> {
    let state = AppState::load(ctx.config_path.clone())?;
    let endpoint = RpcEndpoint::new(state.datasites_dir(), &state.config.email);
    Ok((state, endpoint))
}

/// Wait on a future kept in `store`. Only an answer removes it; timeouts and
/// read errors leave it for a later `rpc wait`.
async fn await_stored(
    store: &FutureStore,
    future: &mut SyftFuture,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<SyftResponse, RpcOpError> {
    match future.wait(Some(timeout), poll_interval).await {
        Ok(response) => {
            store.remove(&future.id)?;
            Ok(response)
        }
        Err(RpcError::Timeout(_)) => Err(RpcOpError::NoResponse {
            id: future.id,
            timeout,
        }),
        Err(e) => {
            tracing::warn!(id = %future.id, "keeping future after failed wait: {}", e);
            Err(e.into())
        }
    }
}

/// `30s`/`5m`/`24h`/`3d` as a std duration.
fn std_duration(value: &str) -> Result<Duration, RpcOpError> {
    parse_duration(value)?
        .to_std()
        .map_err(|_| RpcOpError::InvalidArgument(format!("negative duration: {}", value)))
}

/// `name=value` into its two halves.
fn parse_header(value: &str) -> Result<(String, String), RpcOpError> {
    value
        .split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| RpcOpError::InvalidArgument(format!("expected name=value: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("content-type=text/plain").unwrap(),
            ("content-type".to_string(), "text/plain".to_string())
        );
        assert_eq!(
            parse_header("x=a=b").unwrap(),
            ("x".to_string(), "a=b".to_string())
        );
        assert!(parse_header("novalue").is_err());
        assert!(parse_header("=v").is_err());
    }

    fn pending_future() -> (tempfile::TempDir, RpcEndpoint, common::rpc::SyftRequest, SyftFuture) {
        use common::rpc::{SyftMethod, SyftRequest, SyftUrl};

        let temp = tempfile::TempDir::new().unwrap();
        let datasites = temp.path().join("datasites");
        std::fs::create_dir_all(&datasites).unwrap();
        let alice = RpcEndpoint::new(&datasites, "alice@openmined.org");
        let url = SyftUrl::new("bob@openmined.org", "api_data/ping/rpc").unwrap();
        let request = SyftRequest::new("alice@openmined.org", url, SyftMethod::Get);
        let future = alice.send(&request).unwrap();
        (temp, RpcEndpoint::new(&datasites, "bob@openmined.org"), request, future)
    }

    #[tokio::test]
    async fn test_timed_out_wait_can_resume_from_store() {
        let (temp, bob, request, mut future) = pending_future();
        let store = FutureStore::new(temp.path().join("futures"));
        store.save(&future).unwrap();

        let err = await_stored(
            &store,
            &mut future,
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcOpError::NoResponse { id, .. } if id == future.id));
        assert!(err.to_string().contains(&future.id.to_string()));

        bob.reply_to(&request, common::rpc::SyftStatus::Ok, Some(b"pong".to_vec()))
            .unwrap();
        let mut resumed = store.load(&future.id).unwrap();
        let response = await_stored(
            &store,
            &mut resumed,
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(response.text(), "pong");
        assert!(matches!(
            store.load(&future.id),
            Err(RpcError::FutureNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_read_keeps_stored_future() {
        let (temp, _bob, _request, mut future) = pending_future();
        let store = FutureStore::new(temp.path().join("futures"));
        store.save(&future).unwrap();
        std::fs::create_dir_all(future.response_path()).unwrap();

        let result = await_stored(
            &store,
            &mut future,
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(RpcOpError::Rpc(RpcError::Io(_)))));
        assert!(store.load(&future.id).is_ok());
    }

    #[test]
    fn test_std_duration() {
        assert_eq!(std_duration("90s").unwrap(), Duration::from_secs(90));
        assert!(std_duration("soon").is_err());
    }
}
