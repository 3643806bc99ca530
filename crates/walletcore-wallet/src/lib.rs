//! Walletcore wallet orchestration
//!
//! The coordination layer between wallet intents and the ledger engine:
//!
//! - [`WalletService`] maps each intent to its posting plan, across one or
//!   three ledgers, and owns the partial-failure contract
//! - [`guard`] holds the pre- and post-commit invariant checks
//! - The statement module rebuilds per-wallet ordered views directly from
//!   ledger transactions
//!
//! # Invariants
//!
//! 1. Available and lien balances never go negative
//! 2. Lien flows only originate from the same wallet's available account
//! 3. A non-empty reference commits at most once per ledger
//! 4. No transaction crosses currencies; asset precision always comes from
//!    the currency registry

pub mod error;
pub mod guard;
pub mod service;
pub mod statement;

pub use error::{CommittedLeg, Leg, WalletError, WalletResult};
pub use service::{
    ChannelHandle, ChannelLeg, CreditWallet, DebitWallet, LienWallet, MovementReceipt,
    ReleaseLien, ReleaseMode, TransactionLinks, WalletHandle, WalletService,
};
pub use statement::{
    OperationType, ReadFilter, StatementEntry, StatementPage, TransactionListPage,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
