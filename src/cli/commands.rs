//! CLI command implementations

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use ethers::utils::format_units;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::abi::{format_base_units, TokenDescriptor};
use crate::config::{mask_url, Config};
use crate::orchestrator::{RunStatus, TransferOrchestrator};
use crate::trading::rpc::{ChainClient, EthersChain};
use crate::trading::simulation::token_balance;
use crate::wallet::credentials::Credentials;

/// Options of the `transfer` command
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Overrides `transfer.amount`
    pub amount: Option<String>,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Skip the dry run
    pub no_simulate: bool,
}

/// Run one rescue and return the process exit code
///
/// Prints exactly one final status line, whatever happens.
pub async fn transfer(config: &Config, options: TransferOptions, cancel: CancellationToken) -> i32 {
    match run_transfer(config, options, &cancel).await {
        Ok(code) => code,
        Err(e) => {
            println!(
                "Final status: {}: {:#}",
                RunStatus::AbortedBeforeSubmission,
                e
            );
            RunStatus::AbortedBeforeSubmission.exit_code()
        }
    }
}

async fn run_transfer(
    config: &Config,
    options: TransferOptions,
    cancel: &CancellationToken,
) -> Result<i32> {
    let mut config = config.clone();
    if let Some(amount) = options.amount {
        config.transfer.amount = amount;
    }
    if options.no_simulate {
        config.transfer.simulate_before_send = false;
    }
    config.validate()?;

    let credentials = Credentials::from_env()?;
    let descriptor = TokenDescriptor::load(&config.token)?;
    let chain: Arc<dyn ChainClient> = Arc::new(EthersChain::new(&config.rpc)?);

    let orchestrator = TransferOrchestrator::new(config.clone(), descriptor, credentials, chain)?;
    let prepared = orchestrator.prepare()?;

    println!("\n=== TOKEN RESCUE ===\n");
    println!("Token:       {:?}", prepared.request.token);
    println!("Source:      {:?}", prepared.request.source);
    println!("Destination: {:?}", prepared.request.destination);
    println!(
        "Amount:      {} ({} base units)",
        config.transfer.amount, prepared.request.amount
    );
    println!(
        "Gas:         {} @ {} gwei{}",
        config.transfer.gas_limit,
        config.transfer.gas_price_gwei,
        if prepared.gas_funding.is_some() {
            " (funded by the safe wallet)"
        } else {
            ""
        }
    );
    println!("Relay:       {}", mask_url(&config.relay.url));
    println!();

    if !options.yes {
        let confirmed = Confirm::new()
            .with_prompt("Submit this bundle to the private relay?")
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Transfer cancelled by user");
            println!(
                "Final status: {}: declined at confirmation",
                RunStatus::AbortedBeforeSubmission
            );
            return Ok(RunStatus::AbortedBeforeSubmission.exit_code());
        }
    }

    let report = orchestrator.run(cancel).await?;

    if let Some(simulation) = &report.simulation {
        if !simulation.success {
            warn!(
                "Dry run had failed: {}",
                simulation.error.as_deref().unwrap_or("unknown")
            );
        }
    }
    if let Some(bundle) = &report.bundle {
        info!(
            "Bundle {} targeted block {} ({} attempt(s))",
            bundle.bundle_hash.as_deref().unwrap_or("<no hash>"),
            bundle.target_block,
            report.attempts
        );
    }

    println!("{}", report.final_line());
    Ok(report.status.exit_code())
}

/// List the methods of the token interface
pub fn describe(config: &Config) -> Result<()> {
    let descriptor = TokenDescriptor::load(&config.token)?;

    println!("\n=== TOKEN INTERFACE ===\n");
    println!("Address:  {:?}", descriptor.address());
    println!("Decimals: {}", descriptor.decimals());
    println!("ABI:      {}", config.token.abi_path);
    println!();

    for signature in descriptor.encoder().signatures() {
        println!("  {}", signature);
    }

    if !descriptor.encoder().has_method("transfer") {
        println!();
        println!("WARNING: interface has no transfer method, rescue is not possible");
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check RPC connectivity and account balances
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;
    let chain = EthersChain::new(&config.rpc)?;

    print!("RPC Endpoint... ");
    match check_rpc(&chain).await {
        Ok((head, latency)) => println!("OK (block {}, {}ms)", head, latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Chain ID... ");
    match chain.chain_id().await {
        Ok(id) => match config.rpc.chain_id {
            Some(expected) if expected != id => {
                println!("MISMATCH (endpoint {}, configured {})", id, expected);
                all_healthy = false;
            }
            _ => println!("OK ({})", id),
        },
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!("Relay... {}", mask_url(&config.relay.url));

    print!("Token interface... ");
    let descriptor = match TokenDescriptor::load(&config.token) {
        Ok(descriptor) if descriptor.encoder().has_method("transfer") => {
            println!("OK ({} methods)", descriptor.encoder().signatures().len());
            Some(descriptor)
        }
        Ok(descriptor) => {
            println!("FAILED: no transfer method");
            all_healthy = false;
            Some(descriptor)
        }
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
            None
        }
    };

    print!("Credentials... ");
    match Credentials::from_env() {
        Ok(credentials) => {
            println!("OK");

            print!("Funding balance... ");
            match chain.native_balance(credentials.funding.address()).await {
                Ok(balance) => println!(
                    "{} ETH",
                    format_units(balance, "ether").unwrap_or_else(|_| balance.to_string())
                ),
                Err(e) => {
                    println!("FAILED: {}", e);
                    all_healthy = false;
                }
            }

            if let Some(descriptor) = &descriptor {
                print!("Source token balance... ");
                match token_balance(&chain, descriptor, credentials.source.address()).await {
                    Ok(balance) => {
                        println!("{}", format_base_units(balance, descriptor.decimals()))
                    }
                    Err(e) => {
                        println!("FAILED: {}", e);
                        all_healthy = false;
                    }
                }
            }
        }
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

async fn check_rpc(chain: &EthersChain) -> Result<(u64, u64)> {
    let start = Instant::now();
    let head = chain
        .block_number()
        .await
        .context("Failed to read block number")?;
    let latency = start.elapsed().as_millis() as u64;

    Ok((head, latency))
}
