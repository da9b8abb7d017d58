//! Private relay bundle client
//!
//! Submits signed transactions as an atomic bundle for one target block to a
//! Flashbots-compatible relay, then watches the chain to see whether the bundle
//! landed. Requests are authenticated with the funding account's key.

use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::H256;
use ethers::utils::keccak256;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{mask_url, RelayConfig};
use crate::error::{Error, Result};
use crate::wallet::credentials::Account;
use crate::wallet::signer::SignedTransaction;

use super::rpc::ChainClient;

/// Header carrying `<address>:<signature>` of the request body
pub const FLASHBOTS_SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

/// Reference to a submitted bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHandle {
    /// Hash assigned by the relay, if it returned one
    pub bundle_hash: Option<String>,
    /// The only block this bundle may land in
    pub target_block: u64,
    /// Hashes of the bundled transactions, in bundle order
    pub tx_hashes: Vec<H256>,
    pub submitted_at: DateTime<Utc>,
}

/// Final state of one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    /// At least one bundle transaction is in the target block
    Included { block: u64, tx_hashes: Vec<H256> },
    /// The target block was produced without the bundle
    NotIncluded { block: u64 },
    /// The relay never accepted the bundle
    SubmissionError(String),
}

/// How long and how often to wait for the target block
#[derive(Debug, Clone, Copy)]
pub struct OutcomePolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&RelayConfig> for OutcomePolicy {
    fn from(config: &RelayConfig) -> Self {
        Self {
            timeout: config.outcome_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Relay-side view of a bundle, from `flashbots_getBundleStatsV2`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
    pub is_high_priority: Option<bool>,
    pub is_simulated: Option<bool>,
    pub simulated_at: Option<String>,
    pub received_at: Option<String>,
}

/// Client for one private relay endpoint
pub struct PrivateRelayClient {
    http: Client,
    config: RelayConfig,
    /// Funding account key; the compromised key never talks to the relay
    auth: LocalWallet,
    chain: Arc<dyn ChainClient>,
}

impl PrivateRelayClient {
    pub fn new(config: RelayConfig, auth: &Account, chain: Arc<dyn ChainClient>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Relay client initialized for {} (signing as {:?})",
            mask_url(&config.url),
            auth.address()
        );

        Ok(Self {
            http,
            config,
            auth: auth.wallet().clone(),
            chain,
        })
    }

    /// Submit `transactions` as one bundle for exactly `target_block`
    ///
    /// Acceptance by the relay says nothing about inclusion; the relay may drop
    /// the bundle silently.
    pub async fn submit_bundle(
        &self,
        transactions: &[SignedTransaction],
        target_block: u64,
    ) -> Result<BundleHandle> {
        if transactions.is_empty() {
            return Err(Error::RelaySubmission("Empty bundle".to_string()));
        }

        info!(
            "Submitting bundle with {} transactions for block {}",
            transactions.len(),
            target_block
        );

        let params = serde_json::json!([{
            "txs": transactions.iter().map(|tx| tx.raw_hex()).collect::<Vec<_>>(),
            "blockNumber": format!("0x{:x}", target_block),
        }]);

        let result: Option<SendBundleResult> = self.rpc("eth_sendBundle", params).await?;
        let bundle_hash = result.and_then(|r| r.bundle_hash);

        match &bundle_hash {
            Some(hash) => info!("Relay accepted bundle {}", hash),
            None => warn!("Relay accepted bundle without returning a hash"),
        }

        Ok(BundleHandle {
            bundle_hash,
            target_block,
            tx_hashes: transactions.iter().map(|tx| tx.hash).collect(),
            submitted_at: Utc::now(),
        })
    }

    /// Wait until the target block exists, then check it for the bundle
    ///
    /// Polls at `policy.poll_interval`; gives up with `OutcomeTimeout` after
    /// `policy.timeout` and with `Cancelled` when `cancel` fires.
    pub async fn await_outcome(
        &self,
        handle: &BundleHandle,
        policy: &OutcomePolicy,
        cancel: &CancellationToken,
    ) -> Result<BundleOutcome> {
        let target = handle.target_block;
        info!(
            "Waiting for target block {} (timeout {:?})",
            target, policy.timeout
        );

        let poll = async {
            let mut ticker = tokio::time::interval(policy.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.check_inclusion(handle).await {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => debug!("Target block {} not available yet", target),
                    // The timeout bounds how long transient errors can keep us here
                    Err(e) => warn!("Inclusion check failed, will retry: {}", e),
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Stopped waiting for block {}: cancelled", target);
                Err(Error::Cancelled)
            }
            result = tokio::time::timeout(policy.timeout, poll) => {
                result.map_err(|_| Error::OutcomeTimeout {
                    target_block: target,
                    waited_ms: policy.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Relay statistics for a submitted bundle (diagnostics only)
    pub async fn bundle_stats(&self, handle: &BundleHandle) -> Result<Option<BundleStats>> {
        let Some(bundle_hash) = &handle.bundle_hash else {
            return Ok(None);
        };

        let params = serde_json::json!([{
            "bundleHash": bundle_hash,
            "blockNumber": format!("0x{:x}", handle.target_block),
        }]);

        self.rpc("flashbots_getBundleStatsV2", params).await
    }

    /// `None` until the target block is available
    async fn check_inclusion(&self, handle: &BundleHandle) -> Result<Option<BundleOutcome>> {
        let head = self.chain.block_number().await?;
        if head < handle.target_block {
            return Ok(None);
        }

        let Some(block_txs) = self.chain.block_transactions(handle.target_block).await? else {
            return Ok(None);
        };

        let included: Vec<H256> = handle
            .tx_hashes
            .iter()
            .filter(|hash| block_txs.contains(hash))
            .copied()
            .collect();

        if included.is_empty() {
            info!("Bundle not found in block {}", handle.target_block);
            Ok(Some(BundleOutcome::NotIncluded {
                block: handle.target_block,
            }))
        } else {
            info!(
                "Bundle included in block {} ({} of {} transactions)",
                handle.target_block,
                included.len(),
                handle.tx_hashes.len()
            );
            Ok(Some(BundleOutcome::Included {
                block: handle.target_block,
                tx_hashes: included,
            }))
        }
    }

    /// Signed JSON-RPC call with retry on transient failures
    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        })
        .to_string();

        let signature = self.auth_header(&body).await?;

        let max_attempts = self.config.retry_attempts.max(1);
        let base_delay = Duration::from_millis(self.config.retry_base_delay_ms);
        // The attempt counter below is the real bound; this is a backstop
        let backoff = ExponentialBackoff {
            current_interval: base_delay,
            initial_interval: base_delay,
            max_interval: base_delay * 4,
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut attempt = 0u32;

        retry(backoff, || {
            attempt += 1;
            let attempt = attempt;
            let body = &body;
            let signature = &signature;
            async move {
                match self.post::<T>(body, signature).await {
                    Ok(result) => Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_attempts => {
                        warn!("Retryable relay error on {} (attempt {}): {}", method, attempt, e);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => {
                        error!("Relay error on {}: {}", method, e);
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await
    }

    /// Single POST attempt
    async fn post<T: DeserializeOwned>(&self, body: &str, signature: &str) -> Result<Option<T>> {
        let response = self
            .http
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(FLASHBOTS_SIGNATURE_HEADER, signature)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| Error::RelaySubmission(format!("Relay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    Error::RelaySubmission(format!("Relay HTTP {}: {}", status, text))
                } else {
                    Error::RelayRejected(format!("Relay HTTP {}: {}", status, text))
                },
            );
        }

        let rpc_response: RelayRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse relay response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(Error::RelayRejected(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }

        Ok(rpc_response.result)
    }

    /// `<funding address>:<EIP-191 signature of keccak256(body) as hex>`
    async fn auth_header(&self, body: &str) -> Result<String> {
        let digest = format!("0x{:x}", H256::from(keccak256(body.as_bytes())));
        let signature = self
            .auth
            .sign_message(digest)
            .await
            .map_err(|e| Error::Signing(format!("Relay authentication failed: {}", e)))?;

        Ok(format!(
            "{:?}:0x{}",
            self.auth.address(),
            hex::encode(signature.to_vec())
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleResult {
    bundle_hash: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct RelayRpcResponse<T> {
    jsonrpc: Option<String>,
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChain, FUNDING_KEY};
    use crate::wallet::credentials::AccountRole;
    use ethers::types::{Bytes, Signature, U256};
    use mockito::Matcher;

    fn relay_config(url: String) -> RelayConfig {
        RelayConfig {
            url,
            outcome_timeout_secs: 1,
            poll_interval_ms: 10,
            retry_attempts: 2,
            retry_base_delay_ms: 5,
            max_target_blocks: 1,
        }
    }

    fn funding() -> Account {
        Account::from_private_key(AccountRole::Funding, FUNDING_KEY).unwrap()
    }

    fn client(url: String, chain: Arc<MockChain>) -> PrivateRelayClient {
        PrivateRelayClient::new(relay_config(url), &funding(), chain).unwrap()
    }

    fn signed(hash_byte: u8) -> SignedTransaction {
        SignedTransaction {
            raw: Bytes::from(vec![0xf8, hash_byte]),
            hash: H256::repeat_byte(hash_byte),
            from: funding().address(),
            nonce: U256::zero(),
        }
    }

    fn handle(target_block: u64, hashes: Vec<H256>) -> BundleHandle {
        BundleHandle {
            bundle_hash: Some("0xbundle".to_string()),
            target_block,
            tx_hashes: hashes,
            submitted_at: Utc::now(),
        }
    }

    fn policy(timeout_ms: u64) -> OutcomePolicy {
        OutcomePolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_submit_bundle() {
        let mut server = mockito::Server::new_async().await;
        let header = format!("^{:?}:0x[0-9a-f]{{130}}$", funding().address());
        let mock = server
            .mock("POST", "/")
            .match_header(FLASHBOTS_SIGNATURE_HEADER, Matcher::Regex(header))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "method": "eth_sendBundle",
                "params": [{ "txs": ["0xf801", "0xf802"], "blockNumber": "0x65" }]
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"bundleHash":"0xabc"}}"#)
            .create_async()
            .await;

        let client = client(server.url(), Arc::new(MockChain::new(100)));
        let handle = client.submit_bundle(&[signed(1), signed(2)], 101).await.unwrap();

        mock.assert_async().await;
        assert_eq!(handle.bundle_hash.as_deref(), Some("0xabc"));
        assert_eq!(handle.target_block, 101);
        assert_eq!(handle.tx_hashes, vec![H256::repeat_byte(1), H256::repeat_byte(2)]);
    }

    #[tokio::test]
    async fn test_submit_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"bundle too large"}}"#)
            .create_async()
            .await;

        let client = client(server.url(), Arc::new(MockChain::new(100)));
        let result = client.submit_bundle(&[signed(1)], 101).await;
        assert!(matches!(result, Err(Error::RelayRejected(msg)) if msg.contains("bundle too large")));
    }

    #[tokio::test]
    async fn test_submit_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = client(server.url(), Arc::new(MockChain::new(100)));
        let result = client.submit_bundle(&[signed(1)], 101).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(Error::RelaySubmission(_))));
    }

    #[tokio::test]
    async fn test_empty_bundle_rejected() {
        let client = client("http://127.0.0.1:9".to_string(), Arc::new(MockChain::new(100)));
        assert!(client.submit_bundle(&[], 101).await.is_err());
    }

    #[tokio::test]
    async fn test_auth_header_recovers_funding_address() {
        let client = client("http://127.0.0.1:9".to_string(), Arc::new(MockChain::new(100)));
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[]}"#;

        let header = client.auth_header(body).await.unwrap();
        let (address, signature) = header.split_once(':').unwrap();
        assert_eq!(address, format!("{:?}", funding().address()));

        let bytes = hex::decode(signature.trim_start_matches("0x")).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let digest = format!("0x{:x}", H256::from(keccak256(body.as_bytes())));
        assert_eq!(signature.recover(digest).unwrap(), funding().address());
    }

    #[tokio::test]
    async fn test_await_outcome_included() {
        let chain = Arc::new(MockChain::new(100));
        chain.auto_advance(true);
        chain.set_block(101, vec![H256::repeat_byte(9), H256::repeat_byte(2)]);

        let client = client("http://127.0.0.1:9".to_string(), chain);
        let outcome = client
            .await_outcome(
                &handle(101, vec![H256::repeat_byte(1), H256::repeat_byte(2)]),
                &policy(1000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BundleOutcome::Included {
                block: 101,
                tx_hashes: vec![H256::repeat_byte(2)]
            }
        );
    }

    #[tokio::test]
    async fn test_await_outcome_past_block_not_included() {
        // Head is already beyond the target; resolves on the first poll
        let chain = Arc::new(MockChain::new(150));
        chain.set_block(101, vec![H256::repeat_byte(9)]);

        let client = client("http://127.0.0.1:9".to_string(), chain);
        let started = std::time::Instant::now();
        let outcome = client
            .await_outcome(
                &handle(101, vec![H256::repeat_byte(1)]),
                &policy(5000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, BundleOutcome::NotIncluded { block: 101 });
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_await_outcome_times_out_on_stall() {
        let chain = Arc::new(MockChain::new(100));
        let client = client("http://127.0.0.1:9".to_string(), chain);

        let result = client
            .await_outcome(
                &handle(101, vec![H256::repeat_byte(1)]),
                &policy(100),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::OutcomeTimeout { target_block: 101, waited_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_await_outcome_cancelled() {
        let chain = Arc::new(MockChain::new(100));
        let client = client("http://127.0.0.1:9".to_string(), chain);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .await_outcome(&handle(101, vec![H256::repeat_byte(1)]), &policy(5000), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_transient_rpc_errors_keep_polling() {
        let chain = Arc::new(MockChain::new(150));
        chain.fail_next_block_queries(2);
        chain.set_block(101, vec![H256::repeat_byte(1)]);

        let client = client("http://127.0.0.1:9".to_string(), chain);
        let outcome = client
            .await_outcome(
                &handle(101, vec![H256::repeat_byte(1)]),
                &policy(1000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, BundleOutcome::Included { block: 101, .. }));
    }

    #[tokio::test]
    async fn test_bundle_stats_without_hash() {
        let client = client("http://127.0.0.1:9".to_string(), Arc::new(MockChain::new(100)));
        let mut handle = handle(101, vec![]);
        handle.bundle_hash = None;
        assert!(client.bundle_stats(&handle).await.unwrap().is_none());
    }
}
