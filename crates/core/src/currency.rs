//! Currency - validated 3-letter currency codes
//!
//! Accounts and postings carry an ISO-4217 style code. Only the shape is
//! validated (three ASCII letters); FX semantics live outside the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing currency codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Empty currency code")]
    EmptyCode,

    #[error("Currency code must be exactly 3 letters: {0}")]
    InvalidLength(String),

    #[error("Invalid currency code format: {0}")]
    InvalidFormat(String),
}

/// A 3-letter uppercase currency code
///
/// # Examples
/// ```
/// use agentpay_core::CurrencyCode;
///
/// let usd: CurrencyCode = "usd".parse().unwrap();
/// assert_eq!(usd, CurrencyCode::USD);
/// assert_eq!(usd.to_string(), "USD");
///
/// assert!("US".parse::<CurrencyCode>().is_err());
/// assert!("U$D".parse::<CurrencyCode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// US Dollar, the default account currency
    pub const USD: Self = Self(*b"USD");
    /// Euro
    pub const EUR: Self = Self(*b"EUR");
    /// Pound sterling
    pub const GBP: Self = Self(*b"GBP");

    /// Get the code as a string slice
    pub fn as_str(&self) -> &str {
        // Constructed only from validated ASCII letters
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::USD
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();

        if s.is_empty() {
            return Err(CurrencyError::EmptyCode);
        }

        if !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidFormat(s));
        }

        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| CurrencyError::InvalidLength(s.clone()))?;

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(c: CurrencyCode) -> Self {
        c.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!("eur".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
        assert_eq!(" gbp ".parse::<CurrencyCode>().unwrap(), CurrencyCode::GBP);
    }

    #[test]
    fn test_default_is_usd() {
        assert_eq!(CurrencyCode::default(), CurrencyCode::USD);
    }

    #[test]
    fn test_empty_code_error() {
        let result: Result<CurrencyCode, _> = "".parse();
        assert!(matches!(result, Err(CurrencyError::EmptyCode)));
    }

    #[test]
    fn test_length_error() {
        let result: Result<CurrencyCode, _> = "USDT".parse();
        assert!(matches!(result, Err(CurrencyError::InvalidLength(_))));
    }

    #[test]
    fn test_invalid_format_error() {
        let result: Result<CurrencyCode, _> = "U5D".parse();
        assert!(matches!(result, Err(CurrencyError::InvalidFormat(_))));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CurrencyCode::USD).unwrap();
        assert_eq!(json, "\"USD\"");

        let parsed: CurrencyCode = serde_json::from_str("\"jpy\"").unwrap();
        assert_eq!(parsed.as_str(), "JPY");

        assert!(serde_json::from_str::<CurrencyCode>("\"DOLLARS\"").is_err());
    }
}
