//! Decimal scaling between human-readable amounts and base units

use ethers::types::U256;
use ethers::utils::format_units;

use crate::error::{Error, Result};

/// Scale a human-readable amount (e.g. "5" or "1.25") into base units
///
/// Rejects zero, negative, malformed and over-precise amounts. Extra
/// fractional digits are an error rather than being truncated, so distinct
/// inputs never collapse onto the same base amount.
pub fn to_base_units(amount: &str, decimals: u32) -> Result<U256> {
    let amount = amount.trim().replace('_', "");

    if amount.is_empty() {
        return Err(Error::InvalidAmount("amount is empty".to_string()));
    }

    if amount.starts_with('-') {
        return Err(Error::InvalidAmount(format!("amount is negative: {}", amount)));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount.as_str(), ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(Error::InvalidAmount(format!("not a decimal number: {}", amount)));
    }

    if fraction.len() as u32 > decimals {
        return Err(Error::InvalidAmount(format!(
            "{} has more than {} decimal places",
            amount, decimals
        )));
    }

    let digits = format!("{}{}", whole, fraction);
    let scale = U256::from(10u64).checked_pow(U256::from(decimals - fraction.len() as u32));
    let base = U256::from_dec_str(&digits)
        .ok()
        .zip(scale)
        .and_then(|(digits, scale)| digits.checked_mul(scale))
        .ok_or_else(|| Error::InvalidAmount(format!("amount is too large: {}", amount)))?;

    if base.is_zero() {
        return Err(Error::InvalidAmount(format!("amount scales to zero: {}", amount)));
    }

    Ok(base)
}

/// Format base units back into a human-readable amount
pub fn format_base_units(value: U256, decimals: u32) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}
