use clap::Args;

use syncbox_daemon::state::AppState;
use syncbox_daemon::{spawn_service, ServiceConfig};

/// Run the sync server.
#[derive(Args, Debug, Clone)]
pub struct Server {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Keep file metadata in memory instead of the sqlite database
    #[arg(long)]
    pub in_memory: bool,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("state error: {0}")]
    StateError(#[from] syncbox_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Server {
    type Error = ServerError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let config = ServiceConfig {
            api_port: self.api_port.unwrap_or(state.config.api_port),
            storage: state.config.store.clone(),
            sqlite_path: (!self.in_memory).then(|| state.db_path.clone()),
            log_level: state.log_level()?,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("server ended".to_string())
    }
}
