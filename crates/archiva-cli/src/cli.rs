use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archiva")]
#[command(about = "Sync the order archive and reconcile ERP order lifecycles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push local records, pull remote changes, then refresh lifecycles
    Sync,
    /// Pull the remote record set and apply newer copies locally
    Pull,
    /// Upload every local record
    Push,
    /// Link records created from pending submissions to remote orders
    Reconcile,
    /// Reconcile, then refresh ERP lifecycle state for linked records
    Lifecycle {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List archived records
    List {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only records still waiting for a remote order
        #[arg(long)]
        unlinked: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record as JSON
    Show {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Delete a record remotely and locally
    Delete {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Read realtime events as JSON lines from stdin and apply them
    Listen,
    /// Manage CLI profile configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update a profile
    Init {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote API base URL (e.g. <https://api.example.com>)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Local database path for this profile
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
        /// Per-request timeout in milliseconds
        #[arg(long, value_name = "MS")]
        request_timeout_ms: Option<u64>,
        /// Attempts per request, including the first
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Make a profile the active one
    Use {
        /// Profile name
        name: String,
    },
}
