//! Shared test utilities for rpc and snapshot integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use common::rpc::{RpcEndpoint, SyftMethod, SyftRequest, SyftUrl};
use tempfile::TempDir;

pub const ALICE: &str = "alice@openmined.org";
pub const BOB: &str = "bob@openmined.org";

/// A datasites directory shared by both ends, as if sync had already
/// delivered every file.
pub struct RpcEnv {
    pub temp: TempDir,
    pub alice: RpcEndpoint,
    pub bob: RpcEndpoint,
}

impl RpcEnv {
    pub fn datasites(&self) -> &Path {
        self.alice.datasites()
    }
}

/// Route test logs through the test harness; `RUST_LOG` picks the level.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn setup_rpc_env() -> RpcEnv {
    init_test_logging();
    let temp = TempDir::new().unwrap();
    let datasites: PathBuf = temp.path().join("datasites");
    std::fs::create_dir_all(&datasites).unwrap();
    RpcEnv {
        alice: RpcEndpoint::new(&datasites, ALICE),
        bob: RpcEndpoint::new(&datasites, BOB),
        temp,
    }
}

/// `syft://bob/api_data/<app>/rpc`
pub fn bob_url(app: &str) -> SyftUrl {
    SyftUrl::new(BOB, &format!("api_data/{}/rpc", app)).unwrap()
}

pub fn ping(app: &str, body: &str) -> SyftRequest {
    SyftRequest::new(ALICE, bob_url(app), SyftMethod::Post).with_body(body)
}

pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
