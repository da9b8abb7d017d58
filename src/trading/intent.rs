//! Transfer intent building
//!
//! Turns a logical token transfer into an unsigned transaction envelope.
//! Nothing here touches the network.

use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use tracing::debug;

use crate::abi::{parse_address, to_base_units, TokenDescriptor};
use crate::error::{Error, Result};

/// Gas used by a plain native-currency transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Logical intent to move `amount` base units of the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub token: Address,
    pub source: Address,
    pub destination: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
}

/// Transaction fields before nonce, chain id and signature are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
}

impl UnsignedEnvelope {
    /// Upper bound on the fee this envelope can burn
    pub fn max_fee(&self) -> U256 {
        self.gas_limit.saturating_mul(self.gas_price)
    }
}

/// Builds envelopes for the transfer and its gas funding
pub struct TransferIntentBuilder<'a> {
    descriptor: &'a TokenDescriptor,
}

impl<'a> TransferIntentBuilder<'a> {
    pub fn new(descriptor: &'a TokenDescriptor) -> Self {
        Self { descriptor }
    }

    /// Create a request from a human-readable amount, scaled by the token decimals
    pub fn request(
        &self,
        source: Address,
        destination: &str,
        human_amount: &str,
    ) -> Result<TransferRequest> {
        let destination = parse_address(destination).map_err(Error::InvalidDestination)?;
        let amount = to_base_units(human_amount, self.descriptor.decimals())?;

        Ok(TransferRequest {
            token: self.descriptor.address(),
            source,
            destination,
            amount,
        })
    }

    /// Build the unsigned `transfer(destination, amount)` call
    pub fn build(
        &self,
        request: &TransferRequest,
        gas_limit: U256,
        gas_price: U256,
    ) -> Result<UnsignedEnvelope> {
        if request.amount.is_zero() {
            return Err(Error::InvalidAmount("transfer amount is zero".to_string()));
        }

        if request.destination.is_zero() {
            return Err(Error::InvalidDestination(
                "destination is the zero address".to_string(),
            ));
        }

        if request.destination == request.source {
            return Err(Error::InvalidDestination(format!(
                "destination {:?} is the source account",
                request.destination
            )));
        }

        let data = self.descriptor.encoder().encode(
            "transfer",
            &[
                Token::Address(request.destination),
                Token::Uint(request.amount),
            ],
        )?;

        debug!(
            "Built transfer of {} base units to {:?} ({} bytes of call data)",
            request.amount,
            request.destination,
            data.len()
        );

        Ok(UnsignedEnvelope {
            to: request.token,
            data,
            value: U256::zero(),
            gas_limit,
            gas_price,
        })
    }
}

/// Native transfer from the funding account covering the worst-case fee of `transfer`
pub fn build_gas_funding(source: Address, transfer: &UnsignedEnvelope) -> UnsignedEnvelope {
    UnsignedEnvelope {
        to: source,
        data: Bytes::default(),
        value: transfer.max_fee(),
        gas_limit: U256::from(NATIVE_TRANSFER_GAS),
        gas_price: transfer.gas_price,
    }
}
