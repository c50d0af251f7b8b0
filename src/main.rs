//! # dt - Departmental Task Tracker
//!
//! A command-line tracker for departmental tasks broken into milestones, with
//! role-based permissions and progress derived from completed milestones.
//!
//! ## Key Features
//!
//! - **Roles**: creator, admin, hod, project_lead, staff and contract, each with
//!   its own view of the task list and its own set of allowed edits
//! - **Milestones**: ordered steps assigned to a user or a whole department;
//!   task progress and status always follow from how many are done
//! - **Signed sessions**: `dt login` stores an expiring token; every other
//!   command acts as the identity inside it
//! - **Local File Storage**: one JSON document, written atomically, with CSV export
//!
//! ## Quick Start
//!
//! ```bash
//! # First run: create the creator account and log in
//! dt bootstrap --email boss@example.org --password hunter2
//! dt login --email boss@example.org --password hunter2
//!
//! # Register a head of department
//! dt user add --email fin@example.org --password pw --role hod --department Finance
//!
//! # Create a task with milestones and tick one off
//! dt task add "Quarterly close" --department Finance --milestone Draft --milestone Review
//! dt milestone tick "Quarterly close" 1
//! dt task list
//! ```
//!
//! Data is stored in `~/.deptrack/` unless `DEPTRACK_HOME` or `--db` says otherwise.
//! Set `DEPTRACK_LOG=debug` to see what the tracker is doing on stderr.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod due;
pub mod error;
pub mod fields;
pub mod permissions;
pub mod progress;
pub mod scope;
pub mod service;
pub mod task;
pub mod user;
pub mod view;

use cli::Cli;
use cmd::*;
use config::Config;
use error::Result;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("DEPTRACK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    // Completions need neither storage nor a signing secret
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let config = Config::from_env(cli.db)?;
    let mut app = App::new(config, cli.token, cli.json)?;

    match cli.command {
        Commands::Completions { .. } => Ok(()),
        Commands::Bootstrap { email, password, name } => cmd_bootstrap(&mut app, email, password, name),
        Commands::Login { email, password } => cmd_login(&mut app, email, password),
        Commands::Logout => cmd_logout(&app),
        Commands::Whoami => cmd_whoami(&app),
        Commands::User { action } => cmd_user(&mut app, action),
        Commands::Task { action } => cmd_task(&mut app, action),
        Commands::Milestone { action } => cmd_milestone(&mut app, action),
        Commands::Analytics => cmd_analytics(&app),
        Commands::Export { output } => cmd_export(&app, output),
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        if e.is_internal() {
            error!(error = %e, kind = e.kind(), "command failed");
        }
        eprintln!("Error: {}", e.user_message());
        std::process::exit(e.exit_code());
    }
}
