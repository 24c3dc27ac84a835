//! Money Conversion Module
//!
//! Conversion between client-facing decimal strings and the internal
//! `rust_decimal::Decimal` representation. All amount parsing and formatting
//! goes through this module so that binary floating point never touches a
//! balance.
//!
//! ## Rules
//! 1. Amounts are strictly positive and use at most [`AMOUNT_SCALE`] fractional digits
//! 2. No silent rounding: excess precision is rejected, not truncated
//! 3. Currency codes are three ASCII letters, stored upper-case
//!
//! ## Usage
//! ```rust
//! use fjord_ledger::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("100.5").unwrap();
//! assert_eq!(format_amount(amount), "100.50");
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits stored for every amount (`NUMERIC(20,4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// Integer digits allowed before the decimal point (`NUMERIC(20,4)`).
pub const MAX_WHOLE_DIGITS: usize = 16;

/// Fractional digits always shown when formatting.
const DISPLAY_SCALE: u32 = 2;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),
}

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Parse a client amount string into an exact decimal.
///
/// Accepts plain decimal notation only (`"100"`, `"0.25"`). Signs, exponents,
/// leading or trailing dots and more than [`AMOUNT_SCALE`] fractional digits
/// are rejected.
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (whole, frac)
        }
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "not a decimal number: {}",
            amount_str
        )));
    }

    if frac.len() as u32 > AMOUNT_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: AMOUNT_SCALE,
        });
    }

    if whole.trim_start_matches('0').len() > MAX_WHOLE_DIGITS {
        return Err(MoneyError::Overflow);
    }

    let amount = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;

    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(amount)
}

/// Validate and normalize a currency code (`"nok"` → `"NOK"`).
pub fn parse_currency(code: &str) -> Result<String, MoneyError> {
    let code = code.trim();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(MoneyError::InvalidCurrency(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Format a decimal for clients, always showing at least two fractional digits.
///
/// Never loses precision: `1.2345` stays `"1.2345"`, `100` becomes `"100.00"`.
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount.normalize();
    if value.scale() < DISPLAY_SCALE {
        value.rescale(DISPLAY_SCALE);
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_valid() {
        assert_eq!(parse_amount("100").unwrap(), dec!(100));
        assert_eq!(parse_amount("100.00").unwrap(), dec!(100));
        assert_eq!(parse_amount(" 0.0001 ").unwrap(), dec!(0.0001));
        assert_eq!(parse_amount("1234.5").unwrap(), dec!(1234.5));
    }

    #[test]
    fn test_parse_amount_rejects_non_positive() {
        assert_eq!(parse_amount("0"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("0.0000"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("-5"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("+5"), Err(MoneyError::InvalidAmount));
    }

    #[test]
    fn test_parse_amount_rejects_bad_format() {
        for input in ["", "abc", ".5", "5.", "1.2.3", "1e5", "1,000", "NaN", "0x10"] {
            assert!(
                matches!(parse_amount(input), Err(MoneyError::InvalidFormat(_))),
                "expected InvalidFormat for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_amount_precision_overflow() {
        assert_eq!(
            parse_amount("1.00001"),
            Err(MoneyError::PrecisionOverflow {
                provided: 5,
                max: AMOUNT_SCALE
            })
        );
    }

    #[test]
    fn test_parse_amount_overflow() {
        assert_eq!(parse_amount("12345678901234567"), Err(MoneyError::Overflow));
        assert!(parse_amount("1234567890123456").is_ok());
        // leading zeros do not count toward the limit
        assert!(parse_amount("0001234567890123456").is_ok());
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("NOK").unwrap(), "NOK");
        assert_eq!(parse_currency("eur").unwrap(), "EUR");
        assert!(parse_currency("NO").is_err());
        assert!(parse_currency("NOKK").is_err());
        assert!(parse_currency("N0K").is_err());
        assert!(parse_currency("").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(100)), "100.00");
        assert_eq!(format_amount(dec!(0)), "0.00");
        assert_eq!(format_amount(dec!(0.5)), "0.50");
        assert_eq!(format_amount(dec!(1.2345)), "1.2345");
        assert_eq!(format_amount(dec!(-50.1000)), "-50.10");
    }
}
