//! Integration tests for the file based rpc future lifecycle

mod common;

use std::time::Duration;

use ::common::rpc::{
    FutureStore, RpcError, SyftBulkFuture, SyftMethod, SyftRequest, SyftResponse, SyftStatus,
};

#[test]
fn test_pending_until_answered() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();

    assert!(future.request_path().exists());
    assert!(future.resolve().unwrap().is_none());

    let pending = env.bob.pending_requests(&common::bob_url("ping")).unwrap();
    assert_eq!(pending, vec![request.clone()]);

    env.bob
        .reply_to(&request, SyftStatus::Ok, Some(b"pong".to_vec()))
        .unwrap();
    assert!(env
        .bob
        .pending_requests(&common::bob_url("ping"))
        .unwrap()
        .is_empty());

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::Ok);
    assert_eq!(response.text(), "pong");
    assert_eq!(response.sender, common::BOB);
    assert!(!future.request_path().exists());
    assert!(!future.response_path().exists());
}

#[test]
fn test_terminal_result_is_sticky() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();
    env.bob.reply_to(&request, SyftStatus::Ok, None).unwrap();

    let first = future.resolve().unwrap().unwrap();
    // files are gone now; this must not turn into a 404
    let second = future.resolve().unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(second.status_code, SyftStatus::Ok);
}

#[test]
fn test_rejected_is_forbidden() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();

    env.bob.reject(&request).unwrap();
    assert!(future.is_rejected());
    assert!(env
        .bob
        .pending_requests(&common::bob_url("ping"))
        .unwrap()
        .is_empty());

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::Forbidden);
    assert_eq!(response.sender, ::common::rpc::SYSTEM_SENDER);
    assert!(!future.request_path().exists());
    assert!(!future.rejected_path().exists());
}

#[test]
fn test_missing_request_is_not_found() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();
    std::fs::remove_file(future.request_path()).unwrap();

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::NotFound);
}

#[test]
fn test_expired_request() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello").with_expiry(chrono::Duration::seconds(-1));
    let mut future = env.alice.send(&request).unwrap();

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::Expired);
    assert!(!future.request_path().exists());
}

#[test]
fn test_expired_response_keeps_body() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();

    let mut stale = SyftResponse::for_request(&request, common::BOB, SyftStatus::Ok).with_body("late");
    stale.expires = stale.created - chrono::Duration::seconds(1);
    std::fs::write(future.response_path(), stale.to_bytes().unwrap()).unwrap();

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::Expired);
    assert_eq!(response.text(), "late");
}

#[test]
fn test_malformed_response_is_server_error() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();
    std::fs::write(future.response_path(), b"{ not a response").unwrap();

    let response = future.resolve().unwrap().unwrap();
    assert_eq!(response.status_code, SyftStatus::ServerError);
    assert!(!future.response_path().exists());
}

#[test]
fn test_identical_send_reuses_request() {
    let env = common::setup_rpc_env();
    let first = common::ping("ping", "hello");
    let future = env.alice.send(&first).unwrap();

    std::thread::sleep(Duration::from_millis(5));
    let retry = common::ping("ping", "hello");
    assert_eq!(retry.id, first.id);
    let again = env.alice.send(&retry).unwrap();
    assert_eq!(again.expires, future.expires);

    let stored = SyftRequest::from_bytes(&std::fs::read(future.request_path()).unwrap()).unwrap();
    assert_eq!(stored.created, first.created);
}

#[test]
fn test_send_as_someone_else_is_refused() {
    let env = common::setup_rpc_env();
    let forged = SyftRequest::new(common::BOB, common::bob_url("ping"), SyftMethod::Get);
    assert!(matches!(
        env.alice.send(&forged),
        Err(RpcError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_wait_returns_response() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();

    let bob = env.bob.clone();
    let answered = request.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        bob.reply_to(&answered, SyftStatus::Ok, Some(b"pong".to_vec()))
            .unwrap();
    });

    let response = future
        .wait(Some(Duration::from_secs(5)), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(response.text(), "pong");
}

#[tokio::test]
async fn test_wait_times_out_and_can_resume() {
    let env = common::setup_rpc_env();
    let request = common::ping("ping", "hello");
    let mut future = env.alice.send(&request).unwrap();

    let result = future
        .wait(Some(Duration::from_millis(50)), Duration::from_millis(10))
        .await;
    assert!(matches!(result, Err(RpcError::Timeout(_))));
    assert!(future.request_path().exists());

    env.bob.reply_to(&request, SyftStatus::Ok, None).unwrap();
    let response = future
        .wait(Some(Duration::from_secs(1)), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(response.status_code, SyftStatus::Ok);
}

#[tokio::test]
async fn test_wait_rejects_zero_arguments() {
    let env = common::setup_rpc_env();
    let mut future = env.alice.send(&common::ping("ping", "x")).unwrap();

    assert!(matches!(
        future.wait(Some(Duration::ZERO), Duration::from_millis(10)).await,
        Err(RpcError::InvalidArgument(_))
    ));
    assert!(matches!(
        future.wait(None, Duration::ZERO).await,
        Err(RpcError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_gather_completed_returns_partial_results() {
    let env = common::setup_rpc_env();
    let requests: Vec<_> = (0..3)
        .map(|i| common::ping("bulk", &format!("ping {}", i)))
        .collect();
    let futures = requests
        .iter()
        .map(|request| env.alice.send(request).unwrap())
        .collect();
    let mut bulk = SyftBulkFuture::new(futures);

    env.bob
        .reply_to(&requests[0], SyftStatus::Ok, None)
        .unwrap();
    env.bob.reject(&requests[1]).unwrap();

    let responses = bulk
        .gather_completed(Some(Duration::from_millis(100)), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(bulk.successes().count(), 1);
    assert_eq!(bulk.failures().count(), 1);

    env.bob
        .reply_to(&requests[2], SyftStatus::Ok, None)
        .unwrap();
    let responses = bulk
        .gather_completed(None, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(responses.len(), 3);
}

#[tokio::test]
async fn test_gather_completed_gives_up_on_unreadable_member() {
    let env = common::setup_rpc_env();
    let ok = common::ping("bulk", "fine");
    let broken = common::ping("bulk", "broken");
    let ok_future = env.alice.send(&ok).unwrap();
    let broken_future = env.alice.send(&broken).unwrap();

    env.bob.reply_to(&ok, SyftStatus::Ok, None).unwrap();
    // a directory where the response file belongs cannot be read
    std::fs::create_dir_all(broken_future.response_path()).unwrap();

    let mut bulk = SyftBulkFuture::new(vec![ok_future, broken_future.clone()]);
    let responses = tokio::time::timeout(
        Duration::from_secs(5),
        bulk.gather_completed(None, Duration::from_millis(10)),
    )
    .await
    .expect("unreadable member must not stall the bulk wait")
    .unwrap();
    assert_eq!(responses.len(), 2);

    let failed = bulk.failures().next().unwrap();
    assert_eq!(failed.id, broken_future.id);
    assert_eq!(failed.status_code, SyftStatus::ServerError);
}

#[test]
fn test_bulk_id_ignores_order() {
    let env = common::setup_rpc_env();
    let a = env.alice.send(&common::ping("bulk", "a")).unwrap();
    let b = env.alice.send(&common::ping("bulk", "b")).unwrap();

    let forward = SyftBulkFuture::new(vec![a.clone(), b.clone()]);
    let backward = SyftBulkFuture::new(vec![b, a.clone()]);
    assert_eq!(forward.id(), backward.id());
    assert_ne!(forward.id(), SyftBulkFuture::new(vec![a]).id());
}

#[test]
fn test_future_store_round_trip() {
    let env = common::setup_rpc_env();
    let store = FutureStore::new(env.temp.path().join("futures"));
    assert!(store.list().unwrap().is_empty());

    let future = env.alice.send(&common::ping("ping", "persist me")).unwrap();
    store.save(&future).unwrap();
    assert_eq!(store.load(&future.id).unwrap(), future);
    assert_eq!(store.list().unwrap().len(), 1);

    store.remove(&future.id).unwrap();
    assert!(matches!(
        store.load(&future.id),
        Err(RpcError::FutureNotFound(_))
    ));
}
