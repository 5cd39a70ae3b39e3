use std::time::Duration;

use clap::Args;

use syncbox_daemon::process::ClientStartError;
use syncbox_daemon::state::AppState;
use syncbox_daemon::{spawn_client, ClientConfig};

/// Run the client sync loop against the sync server.
#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override milliseconds between sync iterations (default from config)
    #[arg(long)]
    pub sync_interval_ms: Option<u64>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] syncbox_daemon::state::StateError),

    #[error("daemon failed: {0}")]
    Failed(#[from] ClientStartError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let interval_ms = self
            .sync_interval_ms
            .unwrap_or(state.config.sync_interval_ms);

        // --remote overrides the configured server
        let config = ClientConfig {
            email: state.config.email.clone(),
            server_url: ctx.client.base_url().clone(),
            datasites: state.datasites_dir(),
            sync_state_path: state.sync_state_path(),
            interval: Duration::from_millis(interval_ms),
            ignored_folders: state.config.ignored_folders.clone(),
            log_level: state.log_level()?,
            log_dir: self.log_dir.clone(),
        };

        spawn_client(&config).await?;
        Ok("daemon ended".to_string())
    }
}
