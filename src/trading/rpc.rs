//! Network RPC access
//!
//! The orchestrator and relay client only see the narrow [`ChainClient`] trait.
//! [`EthersChain`] implements it over an `ethers` HTTP provider with a per-call
//! timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionRequest, H256, U256};
use tracing::debug;

use crate::config::RpcConfig;
use crate::config::mask_url;
use crate::error::{Error, Result};

/// Read-only view of the chain needed for one rescue attempt
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number
    async fn block_number(&self) -> Result<u64>;

    /// Network identifier used for EIP-155 signing
    async fn chain_id(&self) -> Result<u64>;

    /// Native currency balance in wei
    async fn native_balance(&self, address: Address) -> Result<U256>;

    /// Nonce of `address` as of the latest block
    async fn transaction_count(&self, address: Address) -> Result<U256>;

    /// Read-only `eth_call` against the latest state
    async fn call(&self, from: Address, to: Address, data: Bytes) -> Result<Bytes>;

    /// Transaction hashes of block `number`, or `None` if it does not exist yet
    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<H256>>>;
}

/// [`ChainClient`] over a JSON-RPC HTTP endpoint
pub struct EthersChain {
    provider: Provider<Http>,
    timeout: Duration,
}

impl EthersChain {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.endpoint.as_str()).map_err(|e| {
            Error::Config(format!("Invalid RPC endpoint {}: {}", mask_url(&config.endpoint), e))
        })?;

        debug!("RPC client initialized for {}", mask_url(&config.endpoint));

        Ok(Self {
            provider,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Bound a provider call by the configured timeout
    async fn timed<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::RpcTimeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl ChainClient for EthersChain {
    async fn block_number(&self) -> Result<u64> {
        let number = self.timed(self.provider.get_block_number()).await?;
        Ok(number.as_u64())
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self.timed(self.provider.get_chainid()).await?;
        Ok(id.as_u64())
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        self.timed(self.provider.get_balance(address, None)).await
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        let latest = Some(BlockId::Number(BlockNumber::Latest));
        self.timed(self.provider.get_transaction_count(address, latest))
            .await
    }

    async fn call(&self, from: Address, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().from(from).to(to).data(data).into();
        self.timed(self.provider.call(&tx, None)).await
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<H256>>> {
        let block = self.timed(self.provider.get_block(number)).await?;
        Ok(block.map(|b| b.transactions))
    }
}
