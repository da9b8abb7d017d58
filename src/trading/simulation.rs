//! Read-only calls against current state
//!
//! Token balance lookups and pre-flight simulation of the transfer.

use ethers::abi::Token;
use ethers::types::{Address, U256};
use tracing::{debug, info, warn};

use crate::abi::TokenDescriptor;
use crate::error::{Error, Result};

use super::intent::UnsignedEnvelope;
use super::rpc::ChainClient;

/// Simulation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// Whether simulation succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Decoded boolean return value, when the token returns one
    pub returned: Option<bool>,
}

/// Token balance of `holder` via `balanceOf`
pub async fn token_balance(
    chain: &dyn ChainClient,
    descriptor: &TokenDescriptor,
    holder: Address,
) -> Result<U256> {
    let encoder = descriptor.encoder();
    let data = encoder.encode("balanceOf", &[Token::Address(holder)])?;
    let output = chain.call(holder, descriptor.address(), data).await?;

    match encoder.decode_output("balanceOf", &output)?.first() {
        Some(Token::Uint(balance)) => Ok(*balance),
        other => Err(Error::Decoding(format!(
            "balanceOf returned unexpected value: {:?}",
            other
        ))),
    }
}

/// Simulate the transfer call from `from` without committing anything
///
/// Never fails: RPC errors and reverts are folded into the result.
pub async fn simulate_transfer(
    chain: &dyn ChainClient,
    descriptor: &TokenDescriptor,
    from: Address,
    envelope: &UnsignedEnvelope,
) -> SimulationResult {
    info!("Simulating transfer call...");

    let output = match chain.call(from, envelope.to, envelope.data.clone()).await {
        Ok(output) => output,
        Err(e) => {
            warn!("Simulation failed: {}", e);
            return SimulationResult {
                success: false,
                error: Some(e.to_string()),
                returned: None,
            };
        }
    };

    // Some tokens return nothing from transfer; only an explicit `false` counts as failure
    let returned = if output.is_empty() {
        None
    } else {
        match descriptor.encoder().decode_output("transfer", &output) {
            Ok(tokens) => match tokens.first() {
                Some(Token::Bool(value)) => Some(*value),
                _ => None,
            },
            Err(e) => {
                debug!("Could not decode transfer return data: {}", e);
                None
            }
        }
    };

    let success = returned != Some(false);
    if success {
        debug!("Simulation succeeded, returned: {:?}", returned);
    } else {
        warn!("Simulation returned false");
    }

    SimulationResult {
        success,
        error: (!success).then(|| "transfer returned false".to_string()),
        returned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bool_word, descriptor, uint_word, MockChain};
    use ethers::types::Bytes;

    fn envelope(to: Address) -> UnsignedEnvelope {
        UnsignedEnvelope {
            to,
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            value: U256::zero(),
            gas_limit: U256::from(100_000u64),
            gas_price: U256::from(1u64),
        }
    }

    #[tokio::test]
    async fn test_token_balance() {
        let descriptor = descriptor();
        let chain = MockChain::new(100);
        chain.set_call_response("balanceOf", Ok(uint_word(500_000_000)));

        let balance = token_balance(&chain, &descriptor, Address::repeat_byte(0x22))
            .await
            .unwrap();
        assert_eq!(balance, U256::from(500_000_000u64));
    }

    #[tokio::test]
    async fn test_simulation_success() {
        let descriptor = descriptor();
        let chain = MockChain::new(100);
        chain.set_call_response("transfer", Ok(bool_word(true)));

        let result = simulate_transfer(
            &chain,
            &descriptor,
            Address::repeat_byte(0x22),
            &envelope(descriptor.address()),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.returned, Some(true));
    }

    #[tokio::test]
    async fn test_simulation_revert_is_not_fatal() {
        let descriptor = descriptor();
        let chain = MockChain::new(100);
        chain.set_call_response("transfer", Err("execution reverted".to_string()));

        let result = simulate_transfer(
            &chain,
            &descriptor,
            Address::repeat_byte(0x22),
            &envelope(descriptor.address()),
        )
        .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("execution reverted"));
    }

    #[tokio::test]
    async fn test_simulation_empty_return() {
        let descriptor = descriptor();
        let chain = MockChain::new(100);
        chain.set_call_response("transfer", Ok(Bytes::default()));

        let result = simulate_transfer(
            &chain,
            &descriptor,
            Address::repeat_byte(0x22),
            &envelope(descriptor.address()),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.returned, None);
    }
}
