//! Rescue run orchestration
//!
//! Drives one run through `Init → BalanceChecked → DryRunAttempted → Submitted
//! → Resolved` and classifies the result. Only configuration and encoding
//! problems surface as `Err`; everything that happens once the network is
//! involved ends in a [`TransferReport`] with a final [`RunStatus`].

use std::fmt;
use std::sync::Arc;

use ethers::types::{H256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::abi::{format_base_units, to_base_units, TokenDescriptor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::trading::intent::{
    build_gas_funding, TransferIntentBuilder, TransferRequest, UnsignedEnvelope,
};
use crate::trading::relay::{BundleHandle, BundleOutcome, OutcomePolicy, PrivateRelayClient};
use crate::trading::rpc::ChainClient;
use crate::trading::simulation::{simulate_transfer, token_balance, SimulationResult};
use crate::wallet::credentials::Credentials;
use crate::wallet::signer::{SignedTransaction, TransactionSigner};

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    BalanceChecked,
    DryRunAttempted,
    Submitted,
    Resolved,
}

/// Final classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Included,
    NotIncluded,
    SubmissionError,
    AbortedBeforeSubmission,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Included | RunStatus::NotIncluded => 0,
            RunStatus::SubmissionError => 2,
            RunStatus::AbortedBeforeSubmission => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Included => write!(f, "included"),
            RunStatus::NotIncluded => write!(f, "not included"),
            RunStatus::SubmissionError => write!(f, "submission error"),
            RunStatus::AbortedBeforeSubmission => write!(f, "aborted before submission"),
        }
    }
}

/// Everything built during `Init`, before any network call
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub request: TransferRequest,
    pub transfer: UnsignedEnvelope,
    /// Native transfer from the funding account, when gas funding is enabled
    pub gas_funding: Option<UnsignedEnvelope>,
}

impl PreparedTransfer {
    /// Native balance the funding account needs for the whole bundle
    pub fn required_funding(&self) -> U256 {
        self.gas_funding
            .as_ref()
            .map(|funding| funding.value.saturating_add(funding.max_fee()))
            .unwrap_or_default()
    }
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub status: RunStatus,
    /// Last stage reached
    pub stage: Stage,
    pub request: TransferRequest,
    pub source_balance: Option<U256>,
    pub simulation: Option<SimulationResult>,
    /// Last bundle submitted, if any
    pub bundle: Option<BundleHandle>,
    pub included_block: Option<u64>,
    /// Number of bundles submitted
    pub attempts: u32,
    pub detail: Option<String>,
}

impl TransferReport {
    fn new(request: TransferRequest) -> Self {
        Self {
            status: RunStatus::AbortedBeforeSubmission,
            stage: Stage::Init,
            request,
            source_balance: None,
            simulation: None,
            bundle: None,
            included_block: None,
            attempts: 0,
            detail: None,
        }
    }

    fn finish(mut self, status: RunStatus, detail: Option<String>) -> Self {
        self.status = status;
        self.detail = detail;
        self
    }

    /// The single status line printed at the end of a run
    pub fn final_line(&self) -> String {
        let mut line = format!("Final status: {}", self.status);

        match (self.status, self.included_block, &self.bundle) {
            (RunStatus::Included, Some(block), _) => {
                line.push_str(&format!(" (block {})", block));
            }
            (RunStatus::NotIncluded, _, Some(bundle)) => {
                line.push_str(&format!(" (target block {})", bundle.target_block));
            }
            _ => {}
        }

        if let Some(detail) = &self.detail {
            line.push_str(&format!(": {}", detail));
        }
        line
    }
}

/// Runs a single protected transfer
pub struct TransferOrchestrator {
    config: Config,
    descriptor: TokenDescriptor,
    credentials: Credentials,
    chain: Arc<dyn ChainClient>,
    relay: PrivateRelayClient,
}

impl TransferOrchestrator {
    pub fn new(
        config: Config,
        descriptor: TokenDescriptor,
        credentials: Credentials,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(format!("{:#}", e)))?;

        let relay =
            PrivateRelayClient::new(config.relay.clone(), &credentials.funding, chain.clone())?;

        Ok(Self {
            config,
            descriptor,
            credentials,
            chain,
            relay,
        })
    }

    /// Build request and envelopes without touching the network
    pub fn prepare(&self) -> Result<PreparedTransfer> {
        let transfer_config = &self.config.transfer;

        let request = TransferRequest {
            token: self.descriptor.address(),
            source: self.credentials.source.address(),
            destination: self.credentials.destination,
            amount: to_base_units(&transfer_config.amount, self.descriptor.decimals())?,
        };

        let gas_price = to_base_units(&transfer_config.gas_price_gwei, 9).map_err(|e| {
            Error::Config(format!(
                "Invalid gas price {:?} gwei: {}",
                transfer_config.gas_price_gwei, e
            ))
        })?;

        let transfer = TransferIntentBuilder::new(&self.descriptor).build(
            &request,
            U256::from(transfer_config.gas_limit),
            gas_price,
        )?;

        let gas_funding = transfer_config
            .fund_gas
            .then(|| build_gas_funding(request.source, &transfer));

        Ok(PreparedTransfer {
            request,
            transfer,
            gas_funding,
        })
    }

    /// Execute one run
    ///
    /// `cancel` aborts the run before submission, or stops waiting for the
    /// outcome once the bundle is out.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<TransferReport> {
        let prepared = self.prepare()?;
        let decimals = self.descriptor.decimals();

        info!(
            "Rescuing {} tokens ({} base units) from {:?} to {:?}",
            format_base_units(prepared.request.amount, decimals),
            prepared.request.amount,
            prepared.request.source,
            prepared.request.destination
        );

        let mut report = TransferReport::new(prepared.request.clone());

        // Source token balance is advisory only
        match token_balance(self.chain.as_ref(), &self.descriptor, prepared.request.source).await {
            Ok(balance) => {
                info!(
                    "Source token balance: {} ({} base units)",
                    format_base_units(balance, decimals),
                    balance
                );
                if balance < prepared.request.amount {
                    warn!("Source balance is below the requested amount, transfer will likely revert");
                }
                report.source_balance = Some(balance);
            }
            Err(e) => warn!("Could not read source token balance: {}", e),
        }

        let required = prepared.required_funding();
        if !required.is_zero() {
            let funding = self.credentials.funding.address();
            match self.chain.native_balance(funding).await {
                Ok(available) if available < required => {
                    let e = Error::InsufficientGasFunds {
                        available: available.to_string(),
                        required: required.to_string(),
                    };
                    error!("Funding account {:?}: {}", funding, e);
                    return Ok(report.finish(RunStatus::AbortedBeforeSubmission, Some(e.to_string())));
                }
                Ok(available) => info!("Funding account balance: {} wei", available),
                Err(e) => {
                    error!("Could not read funding account balance: {}", e);
                    return Ok(report.finish(
                        RunStatus::AbortedBeforeSubmission,
                        Some(format!("funding balance check failed: {}", e)),
                    ));
                }
            }
        }
        report.stage = Stage::BalanceChecked;

        if self.config.transfer.simulate_before_send {
            let simulation = simulate_transfer(
                self.chain.as_ref(),
                &self.descriptor,
                prepared.request.source,
                &prepared.transfer,
            )
            .await;
            if !simulation.success {
                warn!("Dry run failed, submitting anyway");
            }
            report.simulation = Some(simulation);
            report.stage = Stage::DryRunAttempted;
        }

        if cancel.is_cancelled() {
            warn!("Cancelled before submission");
            return Ok(report.finish(
                RunStatus::AbortedBeforeSubmission,
                Some("cancelled".to_string()),
            ));
        }

        let bundle = match self.sign_bundle(&prepared).await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("Failed to sign bundle: {}", e);
                return Ok(report.finish(RunStatus::AbortedBeforeSubmission, Some(e.to_string())));
            }
        };

        let policy = OutcomePolicy::from(&self.config.relay);
        let max_attempts = self.config.relay.max_target_blocks.max(1);

        loop {
            let head = match self.chain.block_number().await {
                Ok(head) => head,
                Err(e) if report.attempts == 0 => {
                    error!("Could not read chain head: {}", e);
                    return Ok(report.finish(RunStatus::AbortedBeforeSubmission, Some(e.to_string())));
                }
                Err(e) => {
                    error!("Could not read chain head for resubmission: {}", e);
                    return Ok(report.finish(RunStatus::NotIncluded, None));
                }
            };

            let handle = match self.relay.submit_bundle(&bundle, head + 1).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!("Bundle submission failed: {}", e);
                    return Ok(report.finish(RunStatus::SubmissionError, Some(e.to_string())));
                }
            };
            report.attempts += 1;
            report.stage = Stage::Submitted;
            report.bundle = Some(handle.clone());

            let outcome = self.relay.await_outcome(&handle, &policy, cancel).await;
            report.stage = Stage::Resolved;

            match outcome {
                Ok(BundleOutcome::Included { block, tx_hashes }) => {
                    for hash in &tx_hashes {
                        info!("Included transaction {:?}", hash);
                    }
                    report.included_block = Some(block);
                    return Ok(report.finish(RunStatus::Included, None));
                }
                Ok(BundleOutcome::SubmissionError(reason)) => {
                    return Ok(report.finish(RunStatus::SubmissionError, Some(reason)));
                }
                Ok(BundleOutcome::NotIncluded { block }) => {
                    warn!("Bundle was not included in block {}", block);
                    self.log_bundle_stats(&handle).await;

                    if report.attempts >= max_attempts {
                        return Ok(report.finish(RunStatus::NotIncluded, None));
                    }
                    if nonces_advanced(self.chain.as_ref(), &bundle).await {
                        warn!("Signer nonce moved on, not resubmitting");
                        return Ok(report.finish(RunStatus::NotIncluded, None));
                    }
                    info!(
                        "Resubmitting bundle (attempt {} of {})",
                        report.attempts + 1,
                        max_attempts
                    );
                }
                Err(e) => {
                    // Outcome unknown: the bundle may still land
                    error!("No outcome for bundle targeting block {}: {}", handle.target_block, e);
                    return Ok(report.finish(RunStatus::SubmissionError, Some(e.to_string())));
                }
            }
        }
    }

    /// Sign the bundle in order: gas funding first, then the transfer
    async fn sign_bundle(&self, prepared: &PreparedTransfer) -> Result<Vec<SignedTransaction>> {
        let chain_id = match self.config.rpc.chain_id {
            Some(id) => id,
            None => self.chain.chain_id().await?,
        };

        let mut bundle = Vec::with_capacity(2);

        if let Some(funding) = &prepared.gas_funding {
            let signer = TransactionSigner::new(&self.credentials.funding, chain_id);
            bundle.push(signer.sign_with_fresh_nonce(self.chain.as_ref(), funding).await?);
        }

        let signer = TransactionSigner::new(&self.credentials.source, chain_id);
        bundle.push(
            signer
                .sign_with_fresh_nonce(self.chain.as_ref(), &prepared.transfer)
                .await?,
        );

        info!(
            "Signed bundle of {} transactions on chain {}: {:?}",
            bundle.len(),
            chain_id,
            bundle.iter().map(|tx| tx.hash).collect::<Vec<H256>>()
        );

        Ok(bundle)
    }

    async fn log_bundle_stats(&self, handle: &BundleHandle) {
        match self.relay.bundle_stats(handle).await {
            Ok(Some(stats)) => info!(
                "Relay stats: simulated={:?} high_priority={:?} received_at={:?}",
                stats.is_simulated, stats.is_high_priority, stats.received_at
            ),
            Ok(None) => {}
            Err(e) => warn!("Could not fetch bundle stats: {}", e),
        }
    }
}

/// Whether any signer has used a nonce at or past the one its transaction holds
///
/// Unknown counts as advanced, so a failed query never leads to resubmission.
async fn nonces_advanced(chain: &dyn ChainClient, bundle: &[SignedTransaction]) -> bool {
    for tx in bundle {
        match chain.transaction_count(tx.from).await {
            Ok(current) if current > tx.nonce => return true,
            Ok(_) => {}
            Err(e) => {
                warn!("Could not read nonce of {:?}: {}", tx.from, e);
                return true;
            }
        }
    }
    false
}
