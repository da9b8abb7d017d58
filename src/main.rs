//! Token Rescue - move ERC-20 tokens out of a compromised account
//!
//! # WARNING
//! - The compromised key is assumed to be watched by a sweeper bot.
//! - A bundle that is not included costs nothing, but gives no guarantee either.
//! - Run `rescue health` and `rescue describe` before the real transfer.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use token_rescue::cli::commands::{self, TransferOptions};
use token_rescue::config::Config;
use token_rescue::RunStatus;

/// Token Rescue - private bundle transfer out of a compromised account
#[derive(Parser)]
#[command(name = "rescue")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rescue.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the tokens to the destination through the private relay
    Transfer {
        /// Human-readable amount (overrides transfer.amount)
        #[arg(long)]
        amount: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,

        /// Skip the dry run before submission
        #[arg(long)]
        no_simulate: bool,
    },

    /// List the methods of the token interface
    Describe,

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (RPC, token interface, balances)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("token_rescue=info".parse()?),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            if matches!(cli.command, Commands::Transfer { .. }) {
                println!("Final status: {}: {:#}", RunStatus::AbortedBeforeSubmission, e);
            }
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Transfer {
            amount,
            yes,
            no_simulate,
        } => {
            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let options = TransferOptions {
                amount,
                yes,
                no_simulate,
            };
            let code = commands::transfer(&config, options, cancel).await;
            info!("Exiting with code {}", code);
            std::process::exit(code);
        }
        Commands::Describe => commands::describe(&config),
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// First Ctrl-C cancels the run gracefully
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl-C received, cancelling");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
