// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversion between human-readable decimal amounts and a chain's smallest
//! integer unit.
//!
//! Amounts are parsed digit-by-digit into a `U256`; binary floating point is
//! never involved. Fractional digits beyond the asset's precision are
//! truncated, not rounded.

use alloy::primitives::U256;

/// Decimal places per supported asset symbol (upper-case).
const ASSET_DECIMALS: &[(&str, u8)] = &[("USDC", 6), ("USDT", 6), ("SOL", 9), ("ETH", 18)];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount must be greater than zero: {0}")]
    NonPositive(String),
}

/// Look up the decimal places of an asset. Symbols are case-insensitive.
pub fn asset_decimals(asset: &str) -> Result<u8, AmountError> {
    let symbol = asset.trim().to_ascii_uppercase();
    ASSET_DECIMALS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, d)| *d)
        .ok_or(AmountError::UnsupportedAsset(symbol))
}

/// Convert a decimal string such as `"1.5"` into the asset's smallest unit,
/// returned as a base-10 integer string.
pub fn to_smallest_unit(amount: &str, asset: &str) -> Result<String, AmountError> {
    let decimals = asset_decimals(asset)?;
    parse_units(amount, decimals).map(|v| v.to_string())
}

/// Like [`to_smallest_unit`], but rejects amounts that convert to zero,
/// including those truncated to zero by the asset's precision.
pub fn to_positive_smallest_unit(amount: &str, asset: &str) -> Result<String, AmountError> {
    let decimals = asset_decimals(asset)?;
    let value = parse_units(amount, decimals)?;
    if value.is_zero() {
        return Err(AmountError::NonPositive(amount.trim().to_string()));
    }
    Ok(value.to_string())
}

/// Inverse of [`to_smallest_unit`]: format a smallest-unit integer string as
/// a decimal with trailing zeros trimmed.
pub fn from_smallest_unit(raw: &str, asset: &str) -> Result<String, AmountError> {
    let decimals = asset_decimals(asset)?;
    let value = U256::from_str_radix(raw.trim(), 10)
        .map_err(|_| AmountError::InvalidAmount(raw.to_string()))?;
    Ok(format_units(value, decimals))
}

fn parse_units(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    let invalid = || AmountError::InvalidAmount(amount.to_string());
    let trimmed = amount.trim();

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    // Truncate digits the asset cannot represent, then right-pad to scale.
    let kept = &fraction[..fraction.len().min(decimals as usize)];
    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(kept);
    digits.extend(std::iter::repeat('0').take(decimals as usize - kept.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}

fn format_units(value: U256, decimals: u8) -> String {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_usdc_and_eth() {
        assert_eq!(to_smallest_unit("1.5", "USDC").unwrap(), "1500000");
        assert_eq!(to_smallest_unit("2", "ETH").unwrap(), "2000000000000000000");
        assert_eq!(to_smallest_unit("0.000000001", "sol").unwrap(), "1");
    }

    #[test]
    fn truncates_excess_precision() {
        assert_eq!(to_smallest_unit("1.2345679", "USDC").unwrap(), "1234567");
        assert_eq!(to_smallest_unit("0.0000009", "USDT").unwrap(), "0");
    }

    #[test]
    fn accepts_bare_fraction_and_trailing_dot() {
        assert_eq!(to_smallest_unit(".5", "USDC").unwrap(), "500000");
        assert_eq!(to_smallest_unit("7.", "USDC").unwrap(), "7000000");
        assert_eq!(to_smallest_unit(" 10.0 ", "USDC").unwrap(), "10000000");
    }

    #[test]
    fn positive_conversion_rejects_zero() {
        assert_eq!(to_positive_smallest_unit("0.5", "USDC").unwrap(), "500000");
        for zero in ["0", "0.000", " .0 ", "0.0000009"] {
            assert!(
                matches!(to_positive_smallest_unit(zero, "USDC"), Err(AmountError::NonPositive(_))),
                "{zero:?} should be rejected"
            );
        }
        assert!(matches!(
            to_positive_smallest_unit("abc", "USDC"),
            Err(AmountError::InvalidAmount(_))
        ));
    }

    #[test]
    fn handles_amounts_beyond_u128() {
        let raw = to_smallest_unit("1000000000000000000000", "ETH").unwrap();
        assert_eq!(raw, format!("1{}", "0".repeat(39)));
    }

    #[test]
    fn rejects_unknown_asset() {
        assert_eq!(
            to_smallest_unit("1.23", "XYZ"),
            Err(AmountError::UnsupportedAsset("XYZ".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", ".", "abc", "1.2.3", "-1", "+1", "1e6", "1,5"] {
            assert!(
                matches!(to_smallest_unit(bad, "USDC"), Err(AmountError::InvalidAmount(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn smallest_unit_recovers_original_value() {
        for (amount, asset) in [("1.5", "USDC"), ("2", "ETH"), ("0.123456789", "SOL"), ("42.000001", "USDT")] {
            let raw = to_smallest_unit(amount, asset).unwrap();
            let back = from_smallest_unit(&raw, asset).unwrap();
            assert_eq!(back, amount.trim_end_matches('0'));
        }
    }
}
