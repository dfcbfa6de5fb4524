//! fsmon CLI - fsmon command

use anyhow::Result;
use clap::{Parser, Subcommand};
use fsmon_core::Backend;
use std::path::PathBuf;

mod cmd;
mod logging;

/// fsmon - Recursive filesystem change monitor
#[derive(Parser)]
#[command(name = "fsmon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directory trees and print every change
    Watch {
        /// Directories to watch (recursively)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print one JSON object per event
        #[arg(long)]
        json: bool,

        /// Override the configured backend (native or polling)
        #[arg(long)]
        backend: Option<Backend>,

        /// Override the configured maximum number of monitored roots
        #[arg(long)]
        max_monitors: Option<usize>,

        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        duration: Option<u64>,
    },
    /// View and edit configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show every configuration value
    List,
    /// Print one value (e.g. monitor.backend)
    Get {
        /// Configuration key
        key: String,
    },
    /// Change one value and save the file
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },
    /// Show the config file path
    Path {
        /// Create the file with defaults if it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Print an annotated example configuration
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keeps the file writer flushing until exit
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Watch {
            paths,
            json,
            backend,
            max_monitors,
            duration,
        } => cmd::watch::run(
            config,
            cmd::watch::WatchOptions {
                paths,
                json,
                backend,
                max_monitors,
                duration,
            },
        ),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(config),
            ConfigCommands::Get { key } => cmd::config::run_get(config, &key),
            ConfigCommands::Set { key, value } => cmd::config::run_set(config, &key, &value),
            ConfigCommands::Path { create } => cmd::config::run_path(config, create),
            ConfigCommands::Example => cmd::config::run_example(),
        },
    }
}
