//! Invariant guard
//!
//! Pre-emptive request checks that run before any engine call, and post-hoc
//! checks over engine-returned post-commit volumes. The engine stays the
//! authority on balances; the wrapper never re-derives them.

use tracing::error;

use walletcore_engine::Transaction;

use crate::error::{WalletError, WalletResult};

/// Amounts are positive integers in minor units.
pub fn require_positive(amount: i64, what: &str) -> WalletResult<()> {
    if amount <= 0 {
        return Err(WalletError::validation(format!("{what} must be positive")));
    }
    Ok(())
}

/// References drive idempotency; an empty one is a caller bug.
pub fn require_reference(reference: &str) -> WalletResult<()> {
    if reference.is_empty() {
        return Err(WalletError::validation("reference is required"));
    }
    Ok(())
}

/// Preconditions for a channel settlement leg.
pub fn require_channel_leg(channel_amount: i64, amount: i64) -> WalletResult<()> {
    require_positive(channel_amount, "channelAmount")?;
    if channel_amount > amount {
        return Err(WalletError::validation(
            "channel amount cannot exceed wallet debit amount",
        ));
    }
    Ok(())
}

/// Channel accounts may legitimately run negative; a draw past zero is
/// reported to the caller as a warning, not a failure.
pub fn channel_overdraft_warning(
    transaction: &Transaction,
    channel_account: &str,
    asset: &str,
    currency: &str,
) -> Option<String> {
    let balance = transaction.volumes_for(channel_account, asset)?.balance();
    if balance < 0 {
        Some(format!("channel balance is negative: {balance} {currency}"))
    } else {
        None
    }
}

/// A negative available or lien balance at the engine means a broken
/// invariant somewhere below us. Surface it loudly as a 500-class failure.
pub fn check_wallet_volumes(
    transaction: &Transaction,
    accounts: [&str; 2],
    asset: &str,
) -> WalletResult<()> {
    for account in accounts {
        if let Some(volumes) = transaction.volumes_for(account, asset) {
            let balance = volumes.balance();
            if balance < 0 {
                error!(
                    account,
                    balance,
                    tx_id = transaction.id,
                    "engine reported negative wallet balance"
                );
                return Err(WalletError::Fatal {
                    message: format!("invariant violation: {account} balance is {balance}"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use walletcore_engine::{Posting, Volumes};

    fn tx_with_volumes(account: &str, input: i64, output: i64) -> Transaction {
        let mut volumes = BTreeMap::new();
        volumes.insert(
            account.to_string(),
            BTreeMap::from([("USD/2".to_string(), Volumes { input, output })]),
        );
        Transaction {
            id: 1,
            timestamp: Utc::now(),
            reference: "r".into(),
            postings: vec![Posting {
                source: account.into(),
                destination: "world".into(),
                asset: "USD/2".into(),
                amount: output,
            }],
            metadata: BTreeMap::new(),
            post_commit_volumes: volumes,
        }
    }

    #[test]
    fn positive_amounts_only() {
        assert!(require_positive(1, "amount").is_ok());
        assert!(require_positive(0, "amount").is_err());
        assert!(require_positive(-5, "amount").is_err());
    }

    #[test]
    fn channel_leg_bounds() {
        assert!(require_channel_leg(80, 100).is_ok());
        assert!(require_channel_leg(100, 100).is_ok());
        assert!(require_channel_leg(101, 100).is_err());
        assert!(require_channel_leg(0, 100).is_err());
    }

    #[test]
    fn warns_only_on_negative_channel_balance() {
        let overdrawn = tx_with_volumes("channel:c1", 100, 150);
        let warning =
            channel_overdraft_warning(&overdrawn, "channel:c1", "USD/2", "USD").unwrap();
        assert!(warning.contains("-50"));

        let funded = tx_with_volumes("channel:c1", 100, 40);
        assert!(channel_overdraft_warning(&funded, "channel:c1", "USD/2", "USD").is_none());

        // untouched account: nothing to report
        assert!(channel_overdraft_warning(&funded, "channel:c2", "USD/2", "USD").is_none());
    }

    #[test]
    fn negative_wallet_balance_is_fatal() {
        let broken = tx_with_volumes("users:u1:wallets:USD:available", 10, 25);
        let err = check_wallet_volumes(
            &broken,
            ["users:u1:wallets:USD:available", "users:u1:wallets:USD:lien"],
            "USD/2",
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "FATAL");
    }
}
