//! Warden CLI - operator interface for the approval ledger and integrity gate
//!
//! - Generate and inspect signing keys
//! - Append, revoke, count and verify human approvals
//! - Acknowledge ledger corruption after investigation
//! - Run one integrity + autonomy evaluation against live probes
//!
//! Results are printed as JSON on stdout. Failures print
//! `{"error": <code>, "message": <text>}` and exit non-zero: 2 when the
//! ledger is corrupt, halted or cannot sign, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;

use commands::{keys, ledger, status};
use config::WardenConfig;

/// Warden CLI application
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - approval ledger and integrity gate", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ./warden.toml when present)
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage signing keys
    Keys {
        #[command(subcommand)]
        command: keys::KeyCommands,
    },

    /// Manage the approval ledger
    Ledger {
        #[command(subcommand)]
        command: ledger::LedgerCommands,
    },

    /// Evaluate integrity and autonomy conditions
    Status(status::StatusArgs),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = default_filter(cli.verbose);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let body = serde_json::json!({
                "error": error::error_code(&err),
                "message": format!("{err:#}"),
            });
            println!("{body}");
            if error::is_fatal(&err) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Log level used when `RUST_LOG` is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = WardenConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Keys { command } => keys::execute(command, &config).await,
        Commands::Ledger { command } => ledger::execute(command, &config).await,
        Commands::Status(args) => status::execute(args, &config).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
