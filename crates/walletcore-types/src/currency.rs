//! Currency records and the registry gating every wallet operation
//!
//! The registry is built once at startup, either from the
//! `ALLOWED_CURRENCIES` configuration list or from the built-in defaults,
//! and is immutable for the life of the process. Handlers share it behind an
//! `Arc`; there is no mutable global.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precision assigned to currencies that do not declare their own.
pub const DEFAULT_PRECISION: u32 = 2;

/// A currency known to the wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Short opaque code, e.g. `USD`.
    pub code: String,
    /// Decimal scale applied to integer minor units.
    pub precision: u32,
    /// Disabled currencies are rejected before any ledger interaction.
    pub enabled: bool,
    /// Whether balances in this currency may be settled out.
    pub settleable: bool,
}

impl Currency {
    /// A currency with default precision, enabled and settleable.
    pub fn new(code: impl Into<String>) -> Self {
        Self::with_precision(code, DEFAULT_PRECISION)
    }

    /// A currency with an explicit precision, enabled and settleable.
    pub fn with_precision(code: impl Into<String>, precision: u32) -> Self {
        Self {
            code: code.into(),
            precision,
            enabled: true,
            settleable: true,
        }
    }
}

/// Error returned when an operation names a currency the registry does not
/// carry, or one that is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("currency {code} not supported or disabled")]
pub struct UnsupportedCurrency {
    pub code: String,
}

/// Immutable mapping from currency code to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<String, Currency>,
}

impl CurrencyRegistry {
    /// The built-in default set used when no configuration is supplied.
    ///
    /// All enabled; precision 2 except BTC at 8.
    pub fn builtin() -> Self {
        let currencies = [
            Currency::new("USD"),
            Currency::new("EUR"),
            Currency::with_precision("BTC", 8),
            Currency::new("NGN"),
            Currency::new("GHS"),
            Currency::new("KES"),
            Currency::new("ZMW"),
        ];
        Self::from_currencies(currencies)
    }

    /// Build a registry from explicit records.
    pub fn from_currencies(currencies: impl IntoIterator<Item = Currency>) -> Self {
        let currencies = currencies
            .into_iter()
            .map(|c| (c.code.clone(), c))
            .collect();
        Self { currencies }
    }

    /// Build a registry from an `ALLOWED_CURRENCIES`-style list.
    ///
    /// Entries are trimmed and uppercased; blanks are skipped; every entry
    /// gets the default precision. An empty or all-blank list falls back to
    /// the built-in defaults.
    pub fn from_allowed_list(allowed: &str) -> Self {
        let currencies: Vec<Currency> = allowed
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| Currency::new(code.to_uppercase()))
            .collect();
        if currencies.is_empty() {
            Self::builtin()
        } else {
            Self::from_currencies(currencies)
        }
    }

    /// Look a currency up without gating on its enabled flag.
    pub fn lookup(&self, code: &str) -> Option<&Currency> {
        self.currencies.get(code)
    }

    /// Fetch a currency, rejecting unknown and disabled codes.
    pub fn require(&self, code: &str) -> Result<&Currency, UnsupportedCurrency> {
        match self.currencies.get(code) {
            Some(currency) if currency.enabled => Ok(currency),
            _ => Err(UnsupportedCurrency {
                code: code.to_string(),
            }),
        }
    }

    /// Iterate over all registered currencies.
    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    /// Number of registered currencies.
    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    /// Whether the registry is empty. Never true for registries built through
    /// the provided constructors.
    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Display for CurrencyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.currencies.keys().map(String::as_str).collect();
        write!(f, "[{}]", codes.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults() {
        let registry = CurrencyRegistry::builtin();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.require("USD").unwrap().precision, 2);
        assert_eq!(registry.require("BTC").unwrap().precision, 8);
        assert_eq!(registry.require("KES").unwrap().precision, 2);
    }

    #[test]
    fn unknown_currency_rejected() {
        let registry = CurrencyRegistry::builtin();
        let err = registry.require("XAU").unwrap_err();
        assert_eq!(err.code, "XAU");
    }

    #[test]
    fn disabled_currency_rejected() {
        let mut usd = Currency::new("USD");
        usd.enabled = false;
        let registry = CurrencyRegistry::from_currencies([usd.clone()]);
        assert!(registry.require("USD").is_err());
        // lookup still sees the record
        assert_eq!(registry.lookup("USD"), Some(&usd));
    }

    #[test]
    fn allowed_list_uppercases_and_trims() {
        let registry = CurrencyRegistry::from_allowed_list(" usd, ngn ,,BTC ");
        assert_eq!(registry.len(), 3);
        assert!(registry.require("USD").is_ok());
        assert!(registry.require("NGN").is_ok());
        // configured entries all get the default precision, BTC included
        assert_eq!(registry.require("BTC").unwrap().precision, 2);
        assert!(registry.require("EUR").is_err());
    }

    #[test]
    fn empty_allowed_list_falls_back_to_builtin() {
        let registry = CurrencyRegistry::from_allowed_list(" , ,");
        assert_eq!(registry.len(), 7);
    }
}
