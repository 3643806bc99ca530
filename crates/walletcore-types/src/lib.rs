//! Walletcore shared domain types
//!
//! The vocabulary every other walletcore crate speaks:
//!
//! - Currency records and the process-wide immutable [`CurrencyRegistry`]
//! - Wallet identity derivation and the hierarchical ledger account addresses
//! - Ledger naming for the user, channel, and revenue ledgers
//!
//! Everything in this crate is pure data: no I/O, no async, no clocks.

pub mod currency;
pub mod identity;

pub use currency::{Currency, CurrencyRegistry, UnsupportedCurrency};
pub use identity::{
    asset, available_addr, channel_addr, channels_ledger, lien_addr, revenue_addr,
    revenue_ledger, system_control_addr, InvalidWalletId, WalletId, REVENUE_SINK, WORLD,
};
