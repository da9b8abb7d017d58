//! Credential loading for the two rescue accounts
//!
//! Keys come only from the process environment and are never logged.

use std::fmt;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use tracing::info;

use crate::abi::parse_address;
use crate::error::{Error, Result};

/// Funding account key (pays gas, authenticates with the relay)
pub const FUNDING_KEY_VAR: &str = "SAFE_WALLET_PRIVATE_KEY";

/// Key of the compromised account holding the tokens
pub const SOURCE_KEY_VAR: &str = "COMPROMISED_WALLET_PRIVATE_KEY";

/// Where the tokens should end up
pub const DESTINATION_VAR: &str = "DESTINATION_ADDRESS";

/// Role of an account in the rescue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    /// Pays network fees and signs relay requests
    Funding,
    /// Holds the tokens; its key is compromised
    Source,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Funding => write!(f, "funding"),
            AccountRole::Source => write!(f, "source"),
        }
    }
}

/// An address with its signing credential
#[derive(Clone)]
pub struct Account {
    role: AccountRole,
    wallet: LocalWallet,
}

impl Account {
    /// Parse a hex private key (with or without 0x prefix)
    pub fn from_private_key(role: AccountRole, key: &str) -> Result<Self> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);

        // Error text from the parser is dropped so the key can never leak into logs
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|_| Error::InvalidCredential(format!("{} private key is malformed", role)))?;

        Ok(Self { role, wallet })
    }

    pub fn role(&self) -> AccountRole {
        self.role
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("role", &self.role)
            .field("address", &self.address())
            .finish()
    }
}

/// Both accounts plus the destination, validated together
#[derive(Debug, Clone)]
pub struct Credentials {
    pub funding: Account,
    pub source: Account,
    pub destination: Address,
}

impl Credentials {
    /// Build and validate credentials from raw values
    pub fn new(funding_key: &str, source_key: &str, destination: &str) -> Result<Self> {
        let funding = Account::from_private_key(AccountRole::Funding, funding_key)?;
        let source = Account::from_private_key(AccountRole::Source, source_key)?;

        if funding.address() == source.address() {
            return Err(Error::InvalidCredential(
                "funding and source accounts must be distinct".to_string(),
            ));
        }

        let destination = parse_address(destination).map_err(Error::InvalidDestination)?;

        Ok(Self {
            funding,
            source,
            destination,
        })
    }

    /// Load credentials from the process environment
    pub fn from_env() -> Result<Self> {
        let funding_key = require_env(FUNDING_KEY_VAR)?;
        let source_key = require_env(SOURCE_KEY_VAR)?;
        let destination = require_env(DESTINATION_VAR)?;

        let credentials = Self::new(&funding_key, &source_key, &destination)?;

        info!(
            "Loaded credentials: funding={:?} source={:?} destination={:?}",
            credentials.funding.address(),
            credentials.source.address(),
            credentials.destination
        );

        Ok(credentials)
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::MissingEnvVar(name.to_string())),
    }
}
