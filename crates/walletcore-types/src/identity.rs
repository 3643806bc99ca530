//! Wallet identity and ledger account addressing
//!
//! A wallet is a derived entity: `walletId = userId + "-" + currency`. No
//! wallet row is ever persisted; identity is reconstructed by splitting on
//! the last dash, so user ids may themselves contain dashes. Ledger account
//! addresses are hierarchical with `:` separators.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The engine-provided infinite-source counterparty account.
pub const WORLD: &str = "world";

/// The revenue sink account on each revenue ledger.
pub const REVENUE_SINK: &str = "revenue:accumulated";

/// Wallet id parse failure: the id carries no dash to split on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid wallet id {wallet_id:?}: expected {{userId}}-{{currency}}")]
pub struct InvalidWalletId {
    pub wallet_id: String,
}

/// A parsed wallet identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId {
    pub user_id: String,
    pub currency: String,
}

impl WalletId {
    /// Deterministically derive the wallet id for a user and currency.
    pub fn derive(user_id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            currency: currency.into(),
        }
    }

    /// Parse a wallet id back into its parts.
    ///
    /// The user id is the longest prefix before the final `-`; the currency
    /// is the suffix. Fails when no dash is present.
    pub fn parse(wallet_id: &str) -> Result<Self, InvalidWalletId> {
        match wallet_id.rsplit_once('-') {
            Some((user_id, currency)) if !user_id.is_empty() && !currency.is_empty() => Ok(Self {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            }),
            _ => Err(InvalidWalletId {
                wallet_id: wallet_id.to_string(),
            }),
        }
    }

    /// The spendable-balance account for this wallet.
    pub fn available_addr(&self) -> String {
        available_addr(&self.user_id, &self.currency)
    }

    /// The reserved-funds account for this wallet.
    pub fn lien_addr(&self) -> String {
        lien_addr(&self.user_id, &self.currency)
    }

    /// The system counterparty account for this wallet's currency.
    pub fn system_control_addr(&self) -> String {
        system_control_addr(&self.currency)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.user_id, self.currency)
    }
}

/// `users:{userId}:wallets:{currency}:available`
pub fn available_addr(user_id: &str, currency: &str) -> String {
    format!("users:{user_id}:wallets:{currency}:available")
}

/// `users:{userId}:wallets:{currency}:lien`
pub fn lien_addr(user_id: &str, currency: &str) -> String {
    format!("users:{user_id}:wallets:{currency}:lien")
}

/// `system:control:{currency}`
pub fn system_control_addr(currency: &str) -> String {
    format!("system:control:{currency}")
}

/// `channel:{channelId}`
pub fn channel_addr(channel_id: &str) -> String {
    format!("channel:{channel_id}")
}

/// The revenue sink address. Constant on every revenue ledger.
pub fn revenue_addr() -> String {
    REVENUE_SINK.to_string()
}

/// Name of the per-currency channel ledger.
pub fn channels_ledger(currency: &str) -> String {
    format!("channels-{currency}")
}

/// Name of the per-currency revenue ledger.
pub fn revenue_ledger(currency: &str) -> String {
    format!("revenue-{currency}")
}

/// Asset string as the engine expects it: `{currency}/{precision}`.
///
/// The precision always comes from the registry record for the currency,
/// never from a literal.
pub fn asset(currency: &str, precision: u32) -> String {
    format!("{currency}/{precision}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_and_display() {
        let id = WalletId::derive("u1", "USD");
        assert_eq!(id.to_string(), "u1-USD");
    }

    #[test]
    fn parse_splits_on_last_dash() {
        let id = WalletId::parse("ada-lovelace-BTC").unwrap();
        assert_eq!(id.user_id, "ada-lovelace");
        assert_eq!(id.currency, "BTC");
    }

    #[test]
    fn parse_round_trips() {
        let id = WalletId::derive("u-2", "NGN");
        assert_eq!(WalletId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_dashless_ids() {
        assert!(WalletId::parse("nodash").is_err());
        assert!(WalletId::parse("").is_err());
    }

    #[test]
    fn parse_rejects_empty_sides() {
        assert!(WalletId::parse("-USD").is_err());
        assert!(WalletId::parse("u1-").is_err());
    }

    #[test]
    fn account_addresses() {
        let id = WalletId::derive("u1", "USD");
        assert_eq!(id.available_addr(), "users:u1:wallets:USD:available");
        assert_eq!(id.lien_addr(), "users:u1:wallets:USD:lien");
        assert_eq!(id.system_control_addr(), "system:control:USD");
        assert_eq!(channel_addr("c9"), "channel:c9");
        assert_eq!(revenue_addr(), "revenue:accumulated");
    }

    #[test]
    fn ledger_names() {
        assert_eq!(channels_ledger("USD"), "channels-USD");
        assert_eq!(revenue_ledger("BTC"), "revenue-BTC");
    }

    #[test]
    fn asset_uses_registry_precision() {
        assert_eq!(asset("USD", 2), "USD/2");
        assert_eq!(asset("BTC", 8), "BTC/8");
    }
}
