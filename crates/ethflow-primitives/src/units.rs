//! Ether denominations

use crate::error::PrimitiveError;
use crate::U256;

/// Wei per gwei
pub const GWEI: u64 = 1_000_000_000;

/// Wei per ether
pub const ETHER: u64 = 1_000_000_000_000_000_000;

/// Conversion of plain integers into wei amounts
pub trait EtherDenom {
    /// Amount already in wei
    fn wei(self) -> U256;
    /// Amount in gwei
    fn gwei(self) -> U256;
    /// Amount in ether
    fn ether(self) -> U256;
}

impl EtherDenom for u64 {
    fn wei(self) -> U256 {
        U256::from(self)
    }

    fn gwei(self) -> U256 {
        U256::from(self) * U256::from(GWEI)
    }

    fn ether(self) -> U256 {
        U256::from(self) * U256::from(ETHER)
    }
}

/// Parse a decimal ether string such as `"1.5"` into wei
pub fn parse_ether(s: &str) -> Result<U256, PrimitiveError> {
    parse_units(s, 18)
}

/// Parse a decimal string scaled by `10^decimals`
pub fn parse_units(s: &str, decimals: usize) -> Result<U256, PrimitiveError> {
    let invalid = || PrimitiveError::InvalidAmount(s.to_string());
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if (whole.is_empty() && frac.is_empty()) || frac.len() > decimals {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let digits = format!("{}{}{}", whole, frac, "0".repeat(decimals - frac.len()));
    U256::from_dec_str(&digits).map_err(|_| invalid())
}

/// Render a wei amount as a decimal string with `decimals` places, trimming trailing zeros
pub fn format_units(value: U256, decimals: usize) -> String {
    let digits = value.to_string();
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denominations() {
        assert_eq!(1u64.ether(), U256::from(ETHER));
        assert_eq!(5u64.gwei(), U256::from(5 * GWEI));
        assert_eq!(9u64.ether(), U256::from_dec_str("9000000000000000000").unwrap());
    }

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("1").unwrap(), 1u64.ether());
        assert_eq!(parse_ether("0.9").unwrap(), U256::from(900_000_000_000_000_000u64));
        assert_eq!(parse_ether(".5").unwrap(), U256::from(500_000_000_000_000_000u64));
        assert!(parse_ether("1.0000000000000000001").is_err());
        assert!(parse_ether("abc").is_err());
        assert!(parse_ether("").is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1u64.ether(), 18), "1");
        assert_eq!(format_units(U256::from(1_230_000_000u64), 9), "1.23");
        assert_eq!(format_units(U256::from(5u64), 9), "0.000000005");
        assert_eq!(format_units(U256::zero(), 18), "0");
    }
}
