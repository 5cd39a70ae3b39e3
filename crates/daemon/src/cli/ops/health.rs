use clap::Args;

use syncbox_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("health check failed: {0}")]
    Failed(String),
}

fn presence(path: &std::path::Path) -> &'static str {
    if path.exists() {
        "OK"
    } else {
        "MISSING"
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory and sync folder
        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                let datasite = state.datasites_dir().join(&state.config.email);
                lines.push(format!("  directory:    {}", state.config_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                lines.push(format!("  email:        {}", state.config.email));
                lines.push(format!(
                    "  datasite:     {} ({})",
                    presence(&datasite),
                    datasite.display()
                ));
                lines.push(format!(
                    "  sync state:   {}",
                    presence(&state.sync_state_path())
                ));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check the sync server
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Sync server ({}):", base));

        for probe in ["livez", "readyz"] {
            let url = format!(
                "{}/_status/{}",
                base.as_str().trim_end_matches('/'),
                probe
            );
            let line = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => format!("  {}: OK", probe),
                Ok(resp) => format!("  {}: UNHEALTHY ({})", probe, resp.status()),
                Err(_) => format!("  {}: NOT REACHABLE", probe),
            };
            lines.push(line);
        }

        Ok(lines.join("\n"))
    }
}
