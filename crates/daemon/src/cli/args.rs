pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "syncbox")]
#[command(about = "Permissioned file sync between datasites, with file based RPC on top")]
pub struct Args {
    /// Sync server to talk to (defaults to the configured server_url)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the syncbox config directory (defaults to ~/.syncbox)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
