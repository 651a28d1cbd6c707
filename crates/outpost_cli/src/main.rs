//! Outpost CLI
//!
//! Operator tools for an Outpost data directory.
//!
//! # Commands
//!
//! - `inspect` - List queued mutations and caches
//! - `drain` - Replay the queue against the network
//! - `send` - Route one request through the controller
//! - `purge` - Remove queued mutations by hand
//! - `verify` - Check the queue log for damage
//! - `compact` - Rewrite the queue log with live entries only

mod commands;
mod network;

use clap::{Parser, Subcommand};
use outpost_engine::EngineConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Outpost offline-sync tools.
#[derive(Parser)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Origin the engine serves (e.g. https://app.example)
    #[arg(global = true, long)]
    origin: Option<String>,

    /// JSON engine configuration file (overrides --origin)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued mutations and cache contents
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay queued mutations against the network
    Drain,

    /// Send one request through the controller
    Send {
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Absolute URL, or a path resolved against the origin
        #[arg(short, long)]
        url: String,

        /// Request header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Remove queued mutations without replaying them
    Purge {
        /// Id of the entry to remove
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<String>,

        /// Remove every entry
        #[arg(long)]
        all: bool,
    },

    /// Verify queue log integrity
    Verify,

    /// Rewrite the queue log keeping only live entries
    Compact {
        /// Dry run - show what would be done
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.data_dir.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Drain => {
            let path = cli.data_dir.ok_or("Data directory required for drain")?;
            let config = load_config(cli.config.as_deref(), cli.origin.as_deref())?;
            commands::drain::run(&path, config)?;
        }
        Commands::Send {
            method,
            url,
            headers,
            body,
        } => {
            let path = cli.data_dir.ok_or("Data directory required for send")?;
            let config = load_config(cli.config.as_deref(), cli.origin.as_deref())?;
            commands::send::run(&path, config, &method, &url, &headers, body)?;
        }
        Commands::Purge { id, all } => {
            let path = cli.data_dir.ok_or("Data directory required for purge")?;
            let target = match id {
                Some(id) if !all => commands::purge::Target::One(id),
                _ => commands::purge::Target::All,
            };
            commands::purge::run(&path, target)?;
        }
        Commands::Verify => {
            let path = cli.data_dir.ok_or("Data directory required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.data_dir.ok_or("Data directory required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("Outpost CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Queue schema v{}", outpost_queue::SCHEMA_VERSION);
            println!("Queue log format v{}", outpost_queue::QUEUE_FORMAT_VERSION);
        }
    }

    Ok(())
}

fn load_config(
    config: Option<&Path>,
    origin: Option<&str>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        return Ok(EngineConfig::from_json(&json)?);
    }
    let origin = origin.ok_or("An origin is required (use --origin or --config)")?;
    Ok(EngineConfig::for_origin(origin)?)
}
