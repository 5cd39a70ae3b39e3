use std::path::PathBuf;
use std::time::Duration;

use file_store::StorageConfig;
use url::Url;

/// Configuration of the sync server.
#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// Port for the sync API HTTP server
    pub api_port: u16,

    // data store configuration
    /// Object storage backend for file content
    pub storage: StorageConfig,
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

/// Configuration of the client sync daemon.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity all requests are made as
    pub email: String,
    /// Sync server to talk to
    pub server_url: Url,
    /// Directory holding one folder per datasite
    pub datasites: PathBuf,
    /// Where the local sync state is persisted
    pub sync_state_path: PathBuf,
    pub interval: Duration,
    pub ignored_folders: Vec<String>,

    // logging
    pub log_level: tracing::Level,
    pub log_dir: Option<PathBuf>,
}
