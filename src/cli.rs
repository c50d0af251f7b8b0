use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Departmental task tracker.
/// Storage defaults to ~/.deptrack/deptrack.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "dt", version, about = "Departmental task and milestone tracker")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true, env = "DEPTRACK_DB")]
    pub db: Option<PathBuf>,

    /// Identity token. Defaults to the session saved by `dt login`.
    #[arg(long, global = true, env = "DEPTRACK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}
