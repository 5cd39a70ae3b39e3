use std::str::FromStr;
use std::{fs, path::PathBuf};

use common::rpc::FutureStore;
use file_store::StorageConfig;
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "syncbox";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "files.db";
pub const OBJECTS_DIR_NAME: &str = "objects";
pub const FUTURES_DIR_NAME: &str = "futures";
pub const DATASITES_DIR_NAME: &str = "datasites";
pub const SYNC_STATE_DIR_NAME: &str = ".syncbox";
pub const SYNC_STATE_FILE_NAME: &str = "local_syncstate.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Own identity; also the name of the own datasite
    pub email: String,
    /// Sync folder, holds `datasites/`
    pub data_dir: PathBuf,
    /// Sync server the client daemon talks to
    #[serde(default = "default_server_url")]
    pub server_url: Url,
    /// Listen port of the sync server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Folder names never synced
    #[serde(default)]
    pub ignored_folders: Vec<String>,
    /// Storage backend of the sync server
    #[serde(default)]
    pub store: StorageConfig,
}

fn default_server_url() -> Url {
    Url::parse("http://localhost:5001").expect("hardcoded URL must parse")
}

fn default_api_port() -> u16 {
    5001
}

fn default_sync_interval_ms() -> u64 {
    common::sync::DEFAULT_SYNC_INTERVAL.as_millis() as u64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn new(email: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            email: email.into(),
            data_dir: data_dir.into(),
            server_url: default_server_url(),
            api_port: default_api_port(),
            sync_interval_ms: default_sync_interval_ms(),
            log_level: default_log_level(),
            ignored_folders: Vec::new(),
            store: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the syncbox directory (~/.syncbox)
    pub config_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the server's SQLite database
    pub db_path: PathBuf,
    /// Path to the persisted rpc futures
    pub futures_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the syncbox directory path (custom or default ~/.syncbox)
    pub fn config_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new syncbox directory and the own datasite folder.
    ///
    /// A config with the memory store is switched to a local store below
    /// the syncbox directory, so `syncbox server` persists by default.
    pub fn init(custom_path: Option<PathBuf>, mut config: AppConfig) -> Result<Self, StateError> {
        let config_dir = Self::config_dir(custom_path)?;
        if config_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        if config.email.trim().is_empty() || config.email.contains('/') {
            return Err(StateError::InvalidConfig(format!(
                "invalid email: {:?}",
                config.email
            )));
        }

        fs::create_dir_all(&config_dir)?;
        let futures_path = config_dir.join(FUTURES_DIR_NAME);
        fs::create_dir_all(&futures_path)?;

        if config.store == StorageConfig::Memory {
            config.store = StorageConfig::Local {
                path: config_dir.join(OBJECTS_DIR_NAME),
            };
        }

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let state = Self {
            db_path: config_dir.join(DB_FILE_NAME),
            config_dir,
            config_path,
            futures_path,
            config,
        };
        fs::create_dir_all(state.datasites_dir().join(&state.config.email))?;
        Ok(state)
    }

    /// Load existing state from the syncbox directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let config_dir = Self::config_dir(custom_path)?;

        if !config_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            db_path: config_dir.join(DB_FILE_NAME),
            futures_path: config_dir.join(FUTURES_DIR_NAME),
            config_dir,
            config_path,
            config,
        })
    }

    pub fn datasites_dir(&self) -> PathBuf {
        self.config.data_dir.join(DATASITES_DIR_NAME)
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.config
            .data_dir
            .join(SYNC_STATE_DIR_NAME)
            .join(SYNC_STATE_FILE_NAME)
    }

    pub fn future_store(&self) -> FutureStore {
        FutureStore::new(&self.futures_path)
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.config.log_level)
            .map_err(|_| StateError::InvalidConfig(format!("log_level: {}", self.config.log_level)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("syncbox directory not initialized. Run 'syncbox init' first")]
    NotInitialized,

    #[error("syncbox directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join("config");
        let data_dir = temp.path().join("data");

        let state = AppState::init(
            Some(config_dir.clone()),
            AppConfig::new("alice@openmined.org", &data_dir),
        )
        .unwrap();
        assert!(state.config_path.exists());
        assert!(state.futures_path.is_dir());
        assert!(data_dir.join("datasites/alice@openmined.org").is_dir());
        assert_eq!(
            state.config.store,
            StorageConfig::Local {
                path: config_dir.join(OBJECTS_DIR_NAME)
            }
        );

        let loaded = AppState::load(Some(config_dir.clone())).unwrap();
        assert_eq!(loaded.config.email, "alice@openmined.org");
        assert_eq!(loaded.config.api_port, 5001);
        assert_eq!(loaded.log_level().unwrap(), tracing::Level::INFO);
        assert_eq!(
            loaded.sync_state_path(),
            data_dir.join(".syncbox/local_syncstate.json")
        );

        assert!(matches!(
            AppState::init(
                Some(config_dir),
                AppConfig::new("alice@openmined.org", &data_dir)
            ),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            email = "bob@openmined.org"
            data_dir = "/tmp/bob"
            "#,
        )
        .unwrap();
        assert_eq!(config.server_url.as_str(), "http://localhost:5001/");
        assert_eq!(config.sync_interval_ms, 5000);
        assert_eq!(config.store, StorageConfig::Memory);
        assert!(config.ignored_folders.is_empty());

        let config: AppConfig = toml::from_str(
            r#"
            email = "bob@openmined.org"
            data_dir = "/tmp/bob"
            log_level = "debug"

            [store]
            type = "local"
            path = "/var/lib/syncbox"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store,
            StorageConfig::Local {
                path: PathBuf::from("/var/lib/syncbox")
            }
        );
    }

    #[test]
    fn test_rejects_bad_email() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::init(
                Some(temp.path().join("config")),
                AppConfig::new("a/b", temp.path())
            ),
            Err(StateError::InvalidConfig(_))
        ));
    }
}
