//! Porthub - Main entry point
//!
//! Registers game client topologies and manages which controllers are
//! connected to which ports.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "porthub")]
#[command(about = "Controller topology registry and port manager")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "porthub.toml")]
    config: PathBuf,

    /// Profile directory (overrides the configuration file)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register game client topologies (all configured clients by default)
    Register {
        /// Game client ID
        #[arg(long, requires = "path")]
        id: Option<String>,
        /// Game client install directory
        #[arg(long, requires = "id")]
        path: Option<PathBuf>,
        /// Game client library directory
        #[arg(long, requires = "path")]
        lib_path: Option<PathBuf>,
    },
    /// List registered topologies
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the port tree of a topology with its connection state
    Show {
        /// Topology ID
        id: u32,
    },
    /// Connect a controller to a port
    Connect {
        /// Topology ID
        id: u32,
        /// Port address, e.g. /1
        address: String,
        /// Controller ID (defaults to the last connected controller)
        controller: Option<String>,
    },
    /// Disconnect a port and everything plugged into it
    Disconnect {
        /// Topology ID
        id: u32,
        /// Port address, e.g. /1
        address: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Porthub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override profile directory if specified
    if let Some(profile) = args.profile {
        config.profile.path = profile;
    }

    match args.command {
        Command::Register { id, path, lib_path } => {
            let client = match (id, path) {
                (Some(id), Some(path)) => {
                    let client = porthub_core::GameClient::new(id, path);
                    Some(match lib_path {
                        Some(lib_path) => client.with_lib_path(lib_path),
                        None => client,
                    })
                }
                _ => None,
            };
            commands::register(&config, client)
        }
        Command::List { json } => commands::list(&config, json),
        Command::Show { id } => commands::show(&config, id),
        Command::Connect {
            id,
            address,
            controller,
        } => commands::connect(&config, id, &address, true, controller.as_deref()),
        Command::Disconnect { id, address } => {
            commands::connect(&config, id, &address, false, None)
        }
    }
}
