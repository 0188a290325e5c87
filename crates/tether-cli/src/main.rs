//! tether CLI
//!
//! Watches the status, outbound groups or log stream of a local background
//! service, and manages the client configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether::commands::{self, WatchOptions};
use tether_core::SubscriptionKind;

#[derive(Parser)]
#[command(name = "tether")]
#[command(
    author,
    version,
    about = "Watch status, outbound groups and logs of a local background service"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a service stream and print every update
    Watch {
        /// Stream to subscribe to: status, groups or log
        kind: SubscriptionKind,
        /// Service working directory (overrides config)
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
        /// Log lines kept in memory (overrides config)
        #[arg(long)]
        log_max_lines: Option<usize>,
        /// Print updates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Watch {
            kind,
            working_dir,
            log_max_lines,
            json,
        } => {
            let config = commands::load_client_config(cli.config.as_ref())?;
            let options = WatchOptions {
                kind,
                working_dir,
                log_max_lines,
                json,
            };
            commands::watch_command(config, options).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Path => commands::config_path(cli.config.as_ref())?,
        },
    }

    Ok(())
}
