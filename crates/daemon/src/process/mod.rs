pub mod utils;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::local_state::LocalSyncState;
use common::sync::{SyncConfig, SyncManager};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_NAME: &str = "syncbox.log";

use crate::http_server::{self, api::client::HttpRemote};
use crate::{ClientConfig, ServiceConfig, ServiceState};

/// Handle for gracefully shutting down a running service.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the service shuts down (via signal or explicit shutdown).
    pub async fn wait(self) {
        shutdown_and_join(self.graceful_waiter, self.handles).await;
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(
    log_level: tracing::Level,
    log_dir: Option<&Path>,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Create service state from config, exiting on error.
async fn create_state(service_config: &ServiceConfig) -> ServiceState {
    match ServiceState::from_config(service_config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    }
}

/// Wait for shutdown and join all handles with timeout.
async fn shutdown_and_join(
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
) {
    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}

/// Create state and spawn the sync server, returning the state handle.
///
/// The returned `ShutdownHandle` must be kept alive; dropping it does not stop the service.
pub async fn start_service(service_config: &ServiceConfig) -> (ServiceState, ShutdownHandle) {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker();
    let state = create_state(service_config).await;

    let api_addr = SocketAddr::from(([0, 0, 0, 0], service_config.api_port));
    let mut api_config = http_server::Config::new(api_addr);
    api_config.log_level = service_config.log_level;
    let api_state = state.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = http_server::run_api(api_config, api_state, shutdown_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(port = service_config.api_port, "running sync server");

    let handle = ShutdownHandle {
        graceful_waiter,
        handles: vec![api_handle],
        shutdown_tx,
    };

    (state, handle)
}

/// Spawns the sync server and blocks until a shutdown signal is received.
pub async fn spawn_service(service_config: &ServiceConfig) {
    let _guards = init_logging(service_config.log_level, service_config.log_dir.as_deref());
    let (_, handle) = start_service(service_config).await;
    handle.wait().await;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientStartError {
    #[error("sync folder {0} does not exist")]
    MissingSyncFolder(PathBuf),
    #[error("failed to load local sync state: {0}")]
    LocalState(#[from] common::local_state::LocalStateError),
    #[error("failed to build sync server client: {0}")]
    Api(#[from] http_server::api::client::ApiError),
}

/// Spawn the client sync loop against the configured sync server.
pub fn start_client(
    client_config: &ClientConfig,
) -> Result<(Arc<SyncManager>, ShutdownHandle), ClientStartError> {
    if !client_config.datasites.is_dir() {
        return Err(ClientStartError::MissingSyncFolder(
            client_config.datasites.clone(),
        ));
    }

    let remote = HttpRemote::new(&client_config.server_url, client_config.email.clone())?;
    let local_state = LocalSyncState::load(&client_config.sync_state_path)?;

    let mut sync_config =
        SyncConfig::new(&client_config.datasites).with_interval(client_config.interval);
    for folder in &client_config.ignored_folders {
        sync_config = sync_config.with_ignored_folder(folder.clone());
    }

    let manager = Arc::new(SyncManager::new(
        Arc::new(remote),
        sync_config,
        Arc::new(local_state),
    ));

    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker();
    let sync_manager = manager.clone();
    let sync_handle = tokio::spawn(async move {
        sync_manager.run(shutdown_rx).await;
    });

    tracing::info!(
        email = %client_config.email,
        server = %client_config.server_url,
        "running sync client"
    );

    let handle = ShutdownHandle {
        graceful_waiter,
        handles: vec![sync_handle],
        shutdown_tx,
    };
    Ok((manager, handle))
}

/// Runs the client sync loop until a shutdown signal is received.
pub async fn spawn_client(client_config: &ClientConfig) -> Result<(), ClientStartError> {
    let _guards = init_logging(client_config.log_level, client_config.log_dir.as_deref());
    let (_, handle) = start_client(client_config)?;
    handle.wait().await;
    Ok(())
}
