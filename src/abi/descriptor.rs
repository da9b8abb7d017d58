//! Token descriptor
//!
//! Contract address, interface and decimal precision of the token being moved.
//! Loaded once at startup and never modified.

use std::path::Path;

use ethers::types::Address;
use tracing::{debug, info};

use crate::config::TokenConfig;
use crate::error::{Error, Result};

use super::encoder::InstructionEncoder;
use super::parse_address;

/// Immutable description of the token contract
#[derive(Debug, Clone)]
pub struct TokenDescriptor {
    address: Address,
    encoder: InstructionEncoder,
    decimals: u32,
}

impl TokenDescriptor {
    pub fn new(address: Address, encoder: InstructionEncoder, decimals: u32) -> Self {
        Self {
            address,
            encoder,
            decimals,
        }
    }

    /// Load the descriptor from the token section of the configuration
    pub fn load(config: &TokenConfig) -> Result<Self> {
        let address = parse_address(&config.address)
            .map_err(|e| Error::Config(format!("Invalid token address: {}", e)))?;

        let path = Path::new(&config.abi_path);
        debug!("Loading interface descriptor from {:?}", path);

        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Descriptor(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let encoder = InstructionEncoder::from_json(&json)?;

        info!(
            "Loaded token descriptor {:?} ({} methods, {} decimals)",
            address,
            encoder.signatures().len(),
            config.decimals
        );

        Ok(Self::new(address, encoder, config.decimals))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn encoder(&self) -> &InstructionEncoder {
        &self.encoder
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ERC20_ABI;

    fn token_config(abi_path: &Path) -> TokenConfig {
        TokenConfig {
            address: "0x4527a3B4A8A150403090a99b87efFC96F2195047".to_string(),
            abi_path: abi_path.to_string_lossy().to_string(),
            decimals: 8,
        }
    }

    #[test]
    fn test_load_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contractABI.json");
        std::fs::write(&path, ERC20_ABI).unwrap();

        let descriptor = TokenDescriptor::load(&token_config(&path)).unwrap();
        assert_eq!(descriptor.decimals(), 8);
        assert!(descriptor.encoder().has_method("transfer"));
        assert!(descriptor.encoder().has_method("balanceOf"));
    }

    #[test]
    fn test_missing_descriptor_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = TokenDescriptor::load(&token_config(&dir.path().join("missing.json")));
        assert!(matches!(result, Err(Error::Descriptor(_))));
    }

    #[test]
    fn test_invalid_token_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contractABI.json");
        std::fs::write(&path, ERC20_ABI).unwrap();

        let mut config = token_config(&path);
        config.address = "0x1234".to_string();
        assert!(matches!(TokenDescriptor::load(&config), Err(Error::Config(_))));
    }
}
