use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};

use super::errors::DomainError;

const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];
const THREE_DECIMAL: &[&str] = &["BHD", "JOD", "KWD", "OMR", "TND"];

/// Number of minor-unit digits for an ISO 4217 currency.
pub fn exponent(currency: &str) -> u32 {
    let code = currency.to_ascii_uppercase();
    if ZERO_DECIMAL.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL.contains(&code.as_str()) {
        3
    } else {
        2
    }
}

/// Convert a decimal amount string such as `"19.99"` into integer minor units.
pub fn to_minor_units(amount: &str, currency: &str) -> Result<i64, DomainError> {
    let value = BigDecimal::from_str(amount.trim())
        .map_err(|e| DomainError::validation(format!("invalid amount '{amount}': {e}")))?;
    let factor = BigDecimal::from(10_i64.pow(exponent(currency)));
    (value * factor)
        .round(0)
        .to_i64()
        .ok_or_else(|| DomainError::validation(format!("amount '{amount}' out of range")))
}

/// Like [`to_minor_units`] but treats a missing amount as zero.
pub fn opt_minor_units(amount: Option<&str>, currency: &str) -> Result<i64, DomainError> {
    amount.map_or(Ok(0), |a| to_minor_units(a, currency))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_decimal_currencies() {
        assert_eq!(to_minor_units("19.99", "USD").unwrap(), 1999);
        assert_eq!(to_minor_units("5", "eur").unwrap(), 500);
        assert_eq!(to_minor_units("0.005", "USD").unwrap(), 0);
    }

    #[test]
    fn zero_and_three_decimal_currencies() {
        assert_eq!(to_minor_units("1500", "JPY").unwrap(), 1500);
        assert_eq!(to_minor_units("1.250", "KWD").unwrap(), 1250);
    }

    #[test]
    fn garbage_is_a_validation_error() {
        assert!(matches!(to_minor_units("abc", "USD"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn missing_amount_is_zero() {
        assert_eq!(opt_minor_units(None, "USD").unwrap(), 0);
    }
}
