//! Transaction signing
//!
//! Produces EIP-155 legacy transactions. Signatures are deterministic
//! (RFC 6979), so the same envelope and nonce always give the same bytes.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use tracing::debug;

use crate::error::{Error, Result};
use crate::trading::intent::UnsignedEnvelope;
use crate::trading::rpc::ChainClient;

use super::credentials::Account;

/// Network-ready signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// RLP-encoded signed transaction
    pub raw: Bytes,
    pub hash: H256,
    pub from: Address,
    /// Nonce consumed by this transaction
    pub nonce: U256,
}

impl SignedTransaction {
    /// 0x-prefixed hex of the raw bytes, as relays expect it
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Signs envelopes for one account on one chain
pub struct TransactionSigner {
    wallet: LocalWallet,
    chain_id: u64,
}

impl TransactionSigner {
    pub fn new(account: &Account, chain_id: u64) -> Self {
        Self {
            wallet: account.wallet().clone().with_chain_id(chain_id),
            chain_id,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Current nonce of the signer, from the latest block
    pub async fn fetch_nonce(&self, chain: &dyn ChainClient) -> Result<U256> {
        chain
            .transaction_count(self.address())
            .await
            .map_err(|e| Error::NonceFetch(format!("{:?}: {}", self.address(), e)))
    }

    /// Sign with an explicit nonce
    pub fn sign(&self, envelope: &UnsignedEnvelope, nonce: U256) -> Result<SignedTransaction> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.address())
            .to(envelope.to)
            .value(envelope.value)
            .data(envelope.data.clone())
            .gas(envelope.gas_limit)
            .gas_price(envelope.gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into();

        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| Error::Signing(e.to_string()))?;

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        debug!(
            "Signed transaction {:?} from {:?} with nonce {}",
            hash,
            self.address(),
            nonce
        );

        Ok(SignedTransaction {
            raw,
            hash,
            from: self.address(),
            nonce,
        })
    }

    /// Fetch the nonce and sign immediately after, so it cannot go stale in between
    pub async fn sign_with_fresh_nonce(
        &self,
        chain: &dyn ChainClient,
        envelope: &UnsignedEnvelope,
    ) -> Result<SignedTransaction> {
        let nonce = self.fetch_nonce(chain).await?;
        self.sign(envelope, nonce)
    }
}
