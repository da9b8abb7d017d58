//! Token contract interface module
//!
//! Everything needed to talk to the token contract without touching the network:
//! the interface descriptor, call encoding and decimal scaling.

pub mod descriptor;
pub mod encoder;
pub mod units;

use ethers::types::Address;
use ethers::utils::to_checksum;

// Re-export commonly used types
pub use descriptor::TokenDescriptor;
pub use encoder::InstructionEncoder;
pub use units::{format_base_units, to_base_units};

/// Parse a hex address, enforcing the EIP-55 checksum when the input is mixed case
pub fn parse_address(input: &str) -> std::result::Result<Address, String> {
    let input = input.trim();
    let hex_part = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| format!("address must start with 0x: {}", input))?;

    if hex_part.len() != 40 {
        return Err(format!(
            "address must have 40 hex digits, got {}: {}",
            hex_part.len(),
            input
        ));
    }

    let bytes = hex::decode(hex_part).map_err(|e| format!("invalid hex in {}: {}", input, e))?;
    let address = Address::from_slice(&bytes);

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        let checksummed = to_checksum(&address, None);
        if checksummed[2..] != *hex_part {
            return Err(format!("checksum mismatch for {}", input));
        }
    }

    Ok(address)
}
