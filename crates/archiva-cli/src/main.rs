//! Archiva CLI - drive the order archive sync engine from a terminal
//!
//! Syncs the local archive against the remote authority, reconciles ERP
//! order lifecycles and replays realtime events piped in on stdin.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::CliContext;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::lifecycle::{run_lifecycle, run_reconcile};
use crate::commands::list::{run_list, run_show};
use crate::commands::listen::run_listen;
use crate::commands::sync::{run_pull, run_push, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("archiva=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Config { command } = cli.command {
        return run_config(command, cli.profile.as_deref());
    }

    let context = CliContext::load(cli.db_path, cli.profile.as_deref())?;
    match cli.command {
        Commands::Sync => run_sync(&context).await?,
        Commands::Pull => run_pull(&context).await?,
        Commands::Push => run_push(&context).await?,
        Commands::Reconcile => run_reconcile(&context).await?,
        Commands::Lifecycle { json } => run_lifecycle(json, &context).await?,
        Commands::List {
            limit,
            unlinked,
            json,
        } => run_list(limit, unlinked, json, &context).await?,
        Commands::Show { id } => run_show(&id, &context).await?,
        Commands::Delete { id } => run_delete(&id, &context).await?,
        Commands::Listen => run_listen(&context).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
