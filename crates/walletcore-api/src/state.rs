//! Application state shared across handlers

use std::sync::Arc;

use walletcore_engine::{LedgerEngine, MemoryLedgerEngine};
use walletcore_types::CurrencyRegistry;
use walletcore_wallet::WalletService;

/// Shared application state: the wallet service over an engine handle plus
/// the immutable currency registry. Everything else is per-request.
#[derive(Clone)]
pub struct AppState {
    pub wallets: WalletService,
}

impl AppState {
    pub fn new(engine: Arc<dyn LedgerEngine>, registry: Arc<CurrencyRegistry>) -> Self {
        Self {
            wallets: WalletService::new(engine, registry),
        }
    }

    /// State over the in-memory engine with the built-in registry, for
    /// tests and dev mode.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryLedgerEngine::new()),
            Arc::new(CurrencyRegistry::builtin()),
        )
    }
}
