//! Shared test fixtures: an in-memory chain and a minimal ERC-20 interface

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::{Address, Bytes, H256, U256};

use crate::abi::{InstructionEncoder, TokenDescriptor};
use crate::error::{Error, Result};
use crate::trading::rpc::ChainClient;

/// Well-known development keys (anvil accounts 0 and 1), destination is account 2
pub const FUNDING_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const SOURCE_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const DESTINATION: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

pub const ERC20_ABI: &str = r#"[
    {"type":"function","name":"balanceOf","stateMutability":"view",
     "inputs":[{"name":"account","type":"address"}],
     "outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"decimals","stateMutability":"view",
     "inputs":[],
     "outputs":[{"name":"","type":"uint8"}]},
    {"type":"function","name":"transfer","stateMutability":"nonpayable",
     "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
     "outputs":[{"name":"","type":"bool"}]},
    {"type":"function","name":"approve","stateMutability":"nonpayable",
     "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
     "outputs":[{"name":"","type":"bool"}]}
]"#;

/// Same interface without `transfer`
pub const NO_TRANSFER_ABI: &str = r#"[
    {"type":"function","name":"balanceOf","stateMutability":"view",
     "inputs":[{"name":"account","type":"address"}],
     "outputs":[{"name":"","type":"uint256"}]}
]"#;

pub fn token_address() -> Address {
    crate::abi::parse_address("0x4527a3B4A8A150403090a99b87efFC96F2195047").unwrap()
}

/// P2PS-like token: 8 decimals, standard ERC-20 interface
pub fn descriptor() -> TokenDescriptor {
    TokenDescriptor::new(
        token_address(),
        InstructionEncoder::from_json(ERC20_ABI).unwrap(),
        8,
    )
}

pub fn uint_word(value: u64) -> Bytes {
    let mut word = [0u8; 32];
    U256::from(value).to_big_endian(&mut word);
    Bytes::from(word.to_vec())
}

pub fn bool_word(value: bool) -> Bytes {
    uint_word(value as u64)
}

fn selector(method: &str) -> [u8; 4] {
    let abi: Abi = serde_json::from_str(ERC20_ABI).unwrap();
    abi.function(method).unwrap().short_signature()
}

/// In-memory [`ChainClient`]
///
/// The head only moves when `auto_advance` is on: every head query then
/// returns the current height and bumps it by one.
pub struct MockChain {
    head: AtomicU64,
    auto_advance: AtomicBool,
    chain_id: u64,
    nonces: Mutex<HashMap<Address, U256>>,
    balances: Mutex<HashMap<Address, U256>>,
    call_responses: Mutex<HashMap<[u8; 4], std::result::Result<Bytes, String>>>,
    blocks: Mutex<HashMap<u64, Vec<H256>>>,
    fail_nonces: AtomicBool,
    failing_block_queries: AtomicU32,
    requests: AtomicUsize,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            auto_advance: AtomicBool::new(false),
            chain_id: 1,
            nonces: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            call_responses: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            fail_nonces: AtomicBool::new(false),
            failing_block_queries: AtomicU32::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn auto_advance(&self, enabled: bool) {
        self.auto_advance.store(enabled, Ordering::SeqCst);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_nonce(&self, address: Address, nonce: U256) {
        self.nonces.lock().unwrap().insert(address, nonce);
    }

    pub fn set_native_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    /// Response for any `eth_call` to `method` of the test ERC-20 interface
    pub fn set_call_response(&self, method: &str, response: std::result::Result<Bytes, String>) {
        self.call_responses
            .lock()
            .unwrap()
            .insert(selector(method), response);
    }

    pub fn set_block(&self, number: u64, transactions: Vec<H256>) {
        self.blocks.lock().unwrap().insert(number, transactions);
    }

    pub fn fail_nonce_queries(&self) {
        self.fail_nonces.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_block_queries(&self, count: u32) {
        self.failing_block_queries.store(count, Ordering::SeqCst);
    }

    /// Number of RPC requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64> {
        self.record();

        let failing = self.failing_block_queries.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_block_queries.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Rpc("connection reset".to_string()));
        }

        if self.auto_advance.load(Ordering::SeqCst) {
            Ok(self.head.fetch_add(1, Ordering::SeqCst))
        } else {
            Ok(self.head.load(Ordering::SeqCst))
        }
    }

    async fn chain_id(&self) -> Result<u64> {
        self.record();
        Ok(self.chain_id)
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        self.record();
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        self.record();
        if self.fail_nonces.load(Ordering::SeqCst) {
            return Err(Error::Rpc("nonce query failed".to_string()));
        }
        Ok(self
            .nonces
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, _from: Address, _to: Address, data: Bytes) -> Result<Bytes> {
        self.record();
        let key: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::Rpc("call data too short".to_string()))?;

        match self.call_responses.lock().unwrap().get(&key) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(Error::Rpc(message.clone())),
            None => Err(Error::Rpc("no mock response".to_string())),
        }
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<H256>>> {
        self.record();
        if number > self.head.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(
            self.blocks
                .lock()
                .unwrap()
                .get(&number)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}
