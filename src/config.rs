//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub relay: RelayConfig,
    pub token: TokenConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Fetched from the endpoint when not set
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// How long to wait for the target block before giving up
    #[serde(default = "default_outcome_timeout_secs")]
    pub outcome_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Number of consecutive target blocks to try; 1 means a single attempt
    #[serde(default = "default_max_target_blocks")]
    pub max_target_blocks: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_address")]
    pub address: String,
    /// JSON ABI describing the token contract
    #[serde(default = "default_abi_path")]
    pub abi_path: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Human-readable token amount, scaled by `token.decimals`
    #[serde(default = "default_amount")]
    pub amount: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: String,
    #[serde(default = "default_true")]
    pub simulate_before_send: bool,
    /// Prepend a transaction from the funding account covering the transfer gas
    #[serde(default = "default_true")]
    pub fund_gas: bool,
}

impl RelayConfig {
    pub fn outcome_timeout(&self) -> Duration {
        Duration::from_secs(self.outcome_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".into())
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_relay_url() -> String {
    std::env::var("RELAY_URL").unwrap_or_else(|_| "https://relay.flashbots.net".into())
}

fn default_outcome_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_max_target_blocks() -> u32 {
    1
}

fn default_token_address() -> String {
    "0x4527a3B4A8A150403090a99b87efFC96F2195047".into()
}

fn default_abi_path() -> String {
    "contractABI.json".into()
}

fn default_decimals() -> u32 {
    8
}

fn default_amount() -> String {
    "5".into()
}

fn default_gas_limit() -> u64 {
    100000
}

fn default_gas_price_gwei() -> String {
    "20".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, config::Environment::with_prefix("RESCUE"))
    }

    /// Load with an explicit environment source (prefix `RESCUE_`, separator `__`)
    ///
    /// Values stay strings until deserialized, so amounts keep every digit.
    fn load_with_env<P: AsRef<Path>>(path: P, env: config::Environment) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("relay.url", default_relay_url())?
            .set_default("token.address", default_token_address())?
            .set_default("transfer.amount", default_amount())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix RESCUE_)
            .add_source(env.separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.rpc.endpoint)
            .with_context(|| format!("Invalid RPC endpoint: {}", mask_url(&self.rpc.endpoint)))?;
        url::Url::parse(&self.relay.url)
            .with_context(|| format!("Invalid relay URL: {}", mask_url(&self.relay.url)))?;

        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        if self.relay.poll_interval_ms == 0 {
            anyhow::bail!("relay.poll_interval_ms must be positive");
        }

        if self.relay.poll_interval() >= self.relay.outcome_timeout() {
            anyhow::bail!(
                "relay.poll_interval_ms ({}) must be shorter than relay.outcome_timeout_secs ({}s)",
                self.relay.poll_interval_ms,
                self.relay.outcome_timeout_secs
            );
        }

        if self.relay.max_target_blocks == 0 {
            anyhow::bail!("relay.max_target_blocks must be at least 1");
        }

        // U256 holds at most 77 decimal digits
        if self.token.decimals > 77 {
            anyhow::bail!("token.decimals cannot exceed 77, got {}", self.token.decimals);
        }

        if self.transfer.gas_limit < 21000 {
            anyhow::bail!(
                "transfer.gas_limit must be at least 21000, got {}",
                self.transfer.gas_limit
            );
        }

        if self.transfer.amount.trim().is_empty() {
            anyhow::bail!("transfer.amount must be set");
        }

        if self.transfer.gas_price_gwei.trim().is_empty() {
            anyhow::bail!("transfer.gas_price_gwei must be set");
        }

        Ok(())
    }

    /// Get a display-safe version of config (masks secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
    chain_id: {}
  Relay:
    url: {}
    outcome_timeout: {}s
    poll_interval: {}ms
    max_target_blocks: {}
  Token:
    address: {}
    abi_path: {}
    decimals: {}
  Transfer:
    amount: {}
    gas_limit: {}
    gas_price: {} gwei
    simulate_before_send: {}
    fund_gas: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.rpc
                .chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            mask_url(&self.relay.url),
            self.relay.outcome_timeout_secs,
            self.relay.poll_interval_ms,
            self.relay.max_target_blocks,
            self.token.address,
            self.token.abi_path,
            self.token.decimals,
            self.transfer.amount,
            self.transfer.gas_limit,
            self.transfer.gas_price_gwei,
            self.transfer.simulate_before_send,
            self.transfer.fund_gas,
        )
    }
}

/// Mask sensitive parts of URLs (API keys in query or path)
pub fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else if let Some(idx) = url.find("/v2/") {
        // Alchemy and Infura style keys live in the path
        format!("{}/v2/***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: default_rpc_endpoint(),
                timeout_ms: default_timeout_ms(),
                chain_id: None,
            },
            relay: RelayConfig {
                url: default_relay_url(),
                outcome_timeout_secs: default_outcome_timeout_secs(),
                poll_interval_ms: default_poll_interval_ms(),
                retry_attempts: default_retry_attempts(),
                retry_base_delay_ms: default_retry_base_delay_ms(),
                max_target_blocks: default_max_target_blocks(),
            },
            token: TokenConfig {
                address: default_token_address(),
                abi_path: default_abi_path(),
                decimals: default_decimals(),
            },
            transfer: TransferConfig {
                amount: default_amount(),
                gas_limit: default_gas_limit(),
                gas_price_gwei: default_gas_price_gwei(),
                simulate_before_send: true,
                fund_gas: true,
            },
        }
    }
}
