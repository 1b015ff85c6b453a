//! tether CLI
//!
//! Single binary for tether operations:
//! - Interactive shells on remote debug endpoints
//! - Keep-alive status
//! - Configuration management

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether::commands;
use tt_core::config::{self, ShellConfig};

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "Shared terminal sessions to remote debug endpoints")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
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
    /// Open an interactive shell on an endpoint
    /// Alias: connect
    #[command(alias = "connect")]
    Shell {
        /// Endpoint as host[:port]
        endpoint: String,
        /// Additional endpoints to keep connected in the background
        #[arg(short, long = "background", value_name = "ENDPOINT")]
        background: Vec<String>,
    },

    /// Show whether a tether process is holding connections open
    Status,

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
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Edit config in editor
    Edit,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // Logs go to stderr so they never interleave with remote output
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
        Commands::Shell {
            endpoint,
            background,
        } => {
            let shell_config = load_shell_config(cli.config.as_ref())?;
            commands::shell_command(&shell_config, &endpoint, &background).await?;
        }

        Commands::Status => commands::status_command()?,

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key)?,
            ConfigAction::Set { key, value } => {
                commands::config_set(cli.config.as_ref(), &key, &value)?
            }
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Edit => commands::config_edit(cli.config.as_ref())?,
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(config::default_config_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

/// An explicit path must load; the default path is optional
fn load_shell_config(config_path: Option<&PathBuf>) -> Result<ShellConfig> {
    if let Some(path) = config_path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ShellConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ShellConfig::default())
    }
}
