use std::path::PathBuf;

use clap::Args;
use url::Url;

use syncbox_daemon::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Own identity, also the name of the own datasite
    #[arg(long)]
    pub email: String,

    /// Sync folder holding `datasites/`
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Sync server the client daemon talks to
    #[arg(long, default_value = "http://localhost:5001")]
    pub server_url: Url,

    /// Listen port when running `syncbox server`
    #[arg(long, default_value_t = 5001)]
    pub api_port: u16,

    /// Milliseconds between sync iterations
    #[arg(long)]
    pub sync_interval_ms: Option<u64>,

    /// Folder name never synced (repeatable)
    #[arg(long = "ignore")]
    pub ignored_folders: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] syncbox_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::new(self.email.trim(), &self.data_dir);
        config.server_url = self.server_url.clone();
        config.api_port = self.api_port;
        config.ignored_folders = self.ignored_folders.clone();
        if let Some(interval) = self.sync_interval_ms {
            config.sync_interval_ms = interval;
        }

        let state = AppState::init(ctx.config_path.clone(), config)?;

        let output = format!(
            "Initialized syncbox directory at: {}\n\
             - Config: {}\n\
             - Datasite: {}\n\
             - Sync server: {}\n\
             - Server port: {}",
            state.config_dir.display(),
            state.config_path.display(),
            state.datasites_dir().join(&state.config.email).display(),
            state.config.server_url,
            state.config.api_port,
        );

        Ok(output)
    }
}
