//! Meridian Network Utility CLI
//!
//! Manage identities, tokens, and names on the Meridian network.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meridian_wallet::commands;
use meridian_wallet::config::{self, Config};
use meridian_wallet::dispatch::RunMode;

#[derive(Parser)]
#[command(name = "meridian-wallet")]
#[command(about = "Meridian network utility - identities, tokens, and names")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom data directory
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run mode for this invocation (overrides the configured default)
    #[arg(short, long, global = true, value_enum)]
    mode: Option<RunMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identities and their keys
    Identity {
        #[command(subcommand)]
        cmd: commands::identity::IdentityCmd,
    },

    /// Manage tokens
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCmd,
    },

    /// Manage names
    Domain {
        #[command(subcommand)]
        cmd: commands::domain::DomainCmd,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        cmd: commands::config::ConfigCmd,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    let mut cfg = Config::load(&data_dir)?;
    let mode = cli.mode.unwrap_or(cfg.mode);

    let result = match cli.command {
        Commands::Identity { cmd } => commands::identity::run(cmd, &data_dir, &mut cfg).await,
        Commands::Token { cmd } => commands::token::run(cmd, &data_dir, &cfg, mode).await,
        Commands::Domain { cmd } => commands::domain::run(cmd, &data_dir, &cfg, mode).await,
        Commands::Config { cmd } => commands::config::run(cmd, &data_dir, &mut cfg).await,
    };

    if let Err(e) = &result {
        commands::print_error(&e.to_string());
        std::process::exit(1);
    }

    Ok(())
}
