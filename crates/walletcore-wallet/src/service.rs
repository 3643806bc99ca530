//! Wallet operation orchestrator
//!
//! Maps each wallet intent to a deterministic set of single-posting ledger
//! transactions, across the user ledger and, for channel settlements, the
//! per-currency channel and revenue ledgers. The engine enforces balance
//! non-negativity, reference uniqueness, and idempotency replay; the
//! orchestrator owns the posting plans and the partial-failure contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use walletcore_engine::{
    EngineError, ExecutedTransaction, LedgerEngine, PostingSpec, Transaction, TransactionSpec,
};
use walletcore_types::{
    asset, channel_addr, channels_ledger, revenue_addr, revenue_ledger, CurrencyRegistry,
    WalletId, WORLD,
};

use crate::error::{CommittedLeg, Leg, WalletError, WalletResult};
use crate::guard;

/// Result of wallet creation. Purely derivational; nothing is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletHandle {
    pub wallet_id: String,
    pub user_id: String,
    pub currency: String,
}

/// A credit intent: system control → available.
#[derive(Debug, Clone)]
pub struct CreditWallet {
    pub wallet_id: String,
    pub amount: i64,
    pub reference: String,
    pub idempotency_key: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Optional channel settlement attached to a debit or a lien payout.
#[derive(Debug, Clone)]
pub struct ChannelLeg {
    pub channel_id: String,
    pub amount: i64,
}

/// A debit intent: available → system control, optionally settling through a
/// payment channel.
#[derive(Debug, Clone)]
pub struct DebitWallet {
    pub wallet_id: String,
    pub amount: i64,
    pub reference: String,
    pub idempotency_key: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub channel: Option<ChannelLeg>,
}

/// A lien intent: available → lien.
#[derive(Debug, Clone)]
pub struct LienWallet {
    pub wallet_id: String,
    pub amount: i64,
    pub reference: String,
    pub idempotency_key: Option<String>,
}

/// What happens to released lien funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Funds return to the available balance.
    ReleaseOnly,
    /// Funds leave the wallet subsystem.
    Pay,
}

/// A lien release intent.
#[derive(Debug, Clone)]
pub struct ReleaseLien {
    pub wallet_id: String,
    pub amount: i64,
    /// Must differ from the reference that created the lien: both postings
    /// land on the same ledger and the engine enforces uniqueness there.
    pub reference: String,
    pub mode: ReleaseMode,
    pub idempotency_key: Option<String>,
    pub channel: Option<ChannelLeg>,
}

/// Ids of the secondary transactions a multi-ledger operation committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionLinks {
    pub channel_ledger: Option<String>,
    pub channel_tx_id: Option<u64>,
    pub revenue_ledger: Option<String>,
    pub revenue_tx_id: Option<u64>,
}

impl TransactionLinks {
    /// Flatten into response metadata, the shape callers reconcile with.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        if let (Some(ledger), Some(id)) = (&self.channel_ledger, self.channel_tx_id) {
            metadata.insert("channel_ledger".to_string(), ledger.clone());
            metadata.insert("channel_tx_id".to_string(), id.to_string());
        }
        if let (Some(ledger), Some(id)) = (&self.revenue_ledger, self.revenue_tx_id) {
            metadata.insert("revenue_ledger".to_string(), ledger.clone());
            metadata.insert("revenue_tx_id".to_string(), id.to_string());
        }
        metadata
    }
}

/// Outcome of a debit or release: the primary wallet transaction plus any
/// channel/revenue links and an overdraft warning.
#[derive(Debug, Clone)]
pub struct MovementReceipt {
    pub transaction: Transaction,
    pub replayed: bool,
    pub links: TransactionLinks,
    pub warning: Option<String>,
}

/// A provisioned payment channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub channel_id: String,
    pub currency: String,
    pub ledger: String,
}

/// The wallet wrapper service.
///
/// Owns no mutable state: the registry is immutable after startup and all
/// durable state lives in the engine. Cloning is cheap and handler-friendly.
#[derive(Clone)]
pub struct WalletService {
    pub(crate) engine: Arc<dyn LedgerEngine>,
    pub(crate) registry: Arc<CurrencyRegistry>,
}

impl WalletService {
    pub fn new(engine: Arc<dyn LedgerEngine>, registry: Arc<CurrencyRegistry>) -> Self {
        Self { engine, registry }
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    /// Derive a wallet for a user and currency. No ledger write happens;
    /// accounts materialize on the first credit, debit, or lien.
    pub fn create_wallet(&self, user_id: &str, currency: &str) -> WalletResult<WalletHandle> {
        if user_id.is_empty() || currency.is_empty() {
            return Err(WalletError::validation("userID and currency are required"));
        }
        self.registry.require(currency)?;
        let wallet = WalletId::derive(user_id, currency);
        Ok(WalletHandle {
            wallet_id: wallet.to_string(),
            user_id: wallet.user_id,
            currency: wallet.currency,
        })
    }

    /// Credit a wallet from the system control account, which is allowed to
    /// run negative: its balance mirrors outstanding user-held funds.
    pub async fn credit(
        &self,
        ledger: &str,
        req: CreditWallet,
    ) -> WalletResult<ExecutedTransaction> {
        let (wallet, asset) = self.resolve(&req.wallet_id)?;
        guard::require_positive(req.amount, "amount")?;
        guard::require_reference(&req.reference)?;

        self.engine.create_ledger(ledger).await?;
        let spec = TransactionSpec::new(
            PostingSpec {
                source: wallet.system_control_addr(),
                destination: wallet.available_addr(),
                asset: asset.clone(),
                amount: req.amount,
                source_overdraft: true,
            },
            req.reference.clone(),
        )
        .with_idempotency_key(req.idempotency_key)
        .with_metadata(req.metadata);

        let executed = self.engine.create_transaction(ledger, spec).await?;
        self.check_wallet(&wallet, &asset, &executed.transaction)?;
        info!(
            wallet_id = %req.wallet_id,
            amount = req.amount,
            reference = %req.reference,
            tx_id = executed.transaction.id,
            replayed = executed.replayed,
            "wallet credited"
        );
        Ok(executed)
    }

    /// Debit a wallet. Without a channel this is a single posting; with one,
    /// three ordered legs across the user, channel, and revenue ledgers, all
    /// sharing the caller's reference so retries converge.
    pub async fn debit(&self, ledger: &str, req: DebitWallet) -> WalletResult<MovementReceipt> {
        let (wallet, asset) = self.resolve(&req.wallet_id)?;
        guard::require_positive(req.amount, "amount")?;
        guard::require_reference(&req.reference)?;
        if let Some(channel) = &req.channel {
            guard::require_channel_leg(channel.amount, req.amount)?;
        }

        // Leg 1, the committing step. Insufficient funds surface unchanged.
        self.engine.create_ledger(ledger).await?;
        let spec = TransactionSpec::new(
            PostingSpec {
                source: wallet.available_addr(),
                destination: wallet.system_control_addr(),
                asset: asset.clone(),
                amount: req.amount,
                source_overdraft: false,
            },
            req.reference.clone(),
        )
        .with_idempotency_key(req.idempotency_key)
        .with_metadata(req.metadata);

        let executed = self.engine.create_transaction(ledger, spec).await?;
        self.check_wallet(&wallet, &asset, &executed.transaction)?;

        let mut receipt = MovementReceipt {
            replayed: executed.replayed,
            transaction: executed.transaction,
            links: TransactionLinks::default(),
            warning: None,
        };

        if let Some(channel) = &req.channel {
            self.settle_channel(ledger, &wallet, &asset, &req.reference, req.amount, channel, &mut receipt)
                .await?;
        }

        info!(
            wallet_id = %req.wallet_id,
            amount = req.amount,
            reference = %req.reference,
            tx_id = receipt.transaction.id,
            channel = req.channel.as_ref().map(|c| c.channel_id.as_str()),
            "wallet debited"
        );
        Ok(receipt)
    }

    /// Reserve funds: available → lien. The engine's non-negativity check on
    /// the available account is what keeps lien ≤ available.
    pub async fn lien(&self, ledger: &str, req: LienWallet) -> WalletResult<ExecutedTransaction> {
        let (wallet, asset) = self.resolve(&req.wallet_id)?;
        guard::require_positive(req.amount, "amount")?;
        guard::require_reference(&req.reference)?;

        self.engine.create_ledger(ledger).await?;
        let spec = TransactionSpec::new(
            PostingSpec {
                source: wallet.available_addr(),
                destination: wallet.lien_addr(),
                asset: asset.clone(),
                amount: req.amount,
                source_overdraft: false,
            },
            req.reference.clone(),
        )
        .with_idempotency_key(req.idempotency_key);

        let executed = match self.engine.create_transaction(ledger, spec).await {
            Ok(executed) => executed,
            Err(EngineError::InsufficientFund { .. }) => {
                return Err(WalletError::LienExceedsAvailable)
            }
            Err(err) => return Err(err.into()),
        };
        self.check_wallet(&wallet, &asset, &executed.transaction)?;
        info!(
            wallet_id = %req.wallet_id,
            amount = req.amount,
            reference = %req.reference,
            tx_id = executed.transaction.id,
            "lien placed"
        );
        Ok(executed)
    }

    /// Release reserved funds back to the wallet, or pay them out of the
    /// subsystem. Channel settlement legs run only when paying out.
    pub async fn release_lien(
        &self,
        ledger: &str,
        req: ReleaseLien,
    ) -> WalletResult<MovementReceipt> {
        let (wallet, asset) = self.resolve(&req.wallet_id)?;
        guard::require_positive(req.amount, "amount")?;
        guard::require_reference(&req.reference)?;
        if let Some(channel) = &req.channel {
            if req.mode != ReleaseMode::Pay {
                return Err(WalletError::validation(
                    "channel settlement applies to PAY releases only",
                ));
            }
            guard::require_channel_leg(channel.amount, req.amount)?;
        }

        let destination = match req.mode {
            ReleaseMode::ReleaseOnly => wallet.available_addr(),
            ReleaseMode::Pay => WORLD.to_string(),
        };

        self.engine.create_ledger(ledger).await?;
        let spec = TransactionSpec::new(
            PostingSpec {
                source: wallet.lien_addr(),
                destination,
                asset: asset.clone(),
                amount: req.amount,
                source_overdraft: false,
            },
            req.reference.clone(),
        )
        .with_idempotency_key(req.idempotency_key);

        let executed = self.engine.create_transaction(ledger, spec).await?;
        self.check_wallet(&wallet, &asset, &executed.transaction)?;

        let mut receipt = MovementReceipt {
            replayed: executed.replayed,
            transaction: executed.transaction,
            links: TransactionLinks::default(),
            warning: None,
        };

        if let Some(channel) = &req.channel {
            self.settle_channel(ledger, &wallet, &asset, &req.reference, req.amount, channel, &mut receipt)
                .await?;
        }

        info!(
            wallet_id = %req.wallet_id,
            amount = req.amount,
            reference = %req.reference,
            mode = ?req.mode,
            tx_id = receipt.transaction.id,
            "lien released"
        );
        Ok(receipt)
    }

    /// Provision a payment channel on the per-currency channel ledger.
    pub async fn create_channel(
        &self,
        currency: &str,
        metadata: BTreeMap<String, String>,
    ) -> WalletResult<ChannelHandle> {
        if currency.is_empty() {
            return Err(WalletError::validation("currency is required"));
        }
        self.registry.require(currency)?;

        let channel_id = Uuid::new_v4().to_string();
        let ledger = channels_ledger(currency);
        self.engine.create_ledger(&ledger).await?;

        if !metadata.is_empty() {
            self.engine
                .save_account_metadata(&ledger, &channel_addr(&channel_id), metadata)
                .await?;
        }

        info!(channel_id = %channel_id, ledger = %ledger, "channel created");
        Ok(ChannelHandle {
            channel_id,
            currency: currency.to_string(),
            ledger,
        })
    }

    /// Fund a channel from world.
    pub async fn credit_channel(
        &self,
        channel_id: &str,
        currency: &str,
        amount: i64,
        reference: &str,
    ) -> WalletResult<ExecutedTransaction> {
        let record = self.registry.require(currency)?;
        guard::require_positive(amount, "amount")?;
        guard::require_reference(reference)?;

        let ledger = channels_ledger(currency);
        let spec = TransactionSpec::new(
            PostingSpec {
                source: WORLD.to_string(),
                destination: channel_addr(channel_id),
                asset: asset(currency, record.precision),
                amount,
                source_overdraft: false,
            },
            reference,
        );

        let executed = self.engine.create_transaction(&ledger, spec).await?;
        info!(
            channel_id = %channel_id,
            amount,
            reference = %reference,
            tx_id = executed.transaction.id,
            "channel credited"
        );
        Ok(executed)
    }

    /// Read a channel account with its volumes expanded.
    pub async fn get_channel(
        &self,
        channel_id: &str,
        currency: &str,
    ) -> WalletResult<walletcore_engine::Account> {
        self.registry.require(currency)?;
        let ledger = channels_ledger(currency);
        Ok(self
            .engine
            .get_account(&ledger, &channel_addr(channel_id), true)
            .await?)
    }

    /// Legs 2 and 3 of a channel settlement. Leg 1 is already durable when
    /// this runs, so every failure from here is a partial commit carrying
    /// the committed leg ids.
    async fn settle_channel(
        &self,
        user_ledger: &str,
        wallet: &WalletId,
        asset_str: &str,
        reference: &str,
        amount: i64,
        channel: &ChannelLeg,
        receipt: &mut MovementReceipt,
    ) -> WalletResult<()> {
        let mut committed = vec![CommittedLeg {
            leg: Leg::Wallet,
            ledger: user_ledger.to_string(),
            tx_id: receipt.transaction.id,
        }];

        let channel_ledger = channels_ledger(&wallet.currency);
        let channel_account = channel_addr(&channel.channel_id);
        let spec = TransactionSpec::new(
            PostingSpec {
                source: channel_account.clone(),
                destination: WORLD.to_string(),
                asset: asset_str.to_string(),
                amount: channel.amount,
                source_overdraft: true,
            },
            reference,
        );

        let channel_tx = match self.engine.create_transaction(&channel_ledger, spec).await {
            Ok(executed) => executed.transaction,
            Err(err) => return Err(partial_commit(committed, err)),
        };
        receipt.links.channel_ledger = Some(channel_ledger.clone());
        receipt.links.channel_tx_id = Some(channel_tx.id);
        committed.push(CommittedLeg {
            leg: Leg::Channel,
            ledger: channel_ledger.clone(),
            tx_id: channel_tx.id,
        });

        receipt.warning = guard::channel_overdraft_warning(
            &channel_tx,
            &channel_account,
            asset_str,
            &wallet.currency,
        );
        if receipt.warning.is_some() {
            warn!(
                channel_id = %channel.channel_id,
                ledger = %channel_ledger,
                "channel drew into overdraft"
            );
        }

        let revenue = amount - channel.amount;
        if revenue > 0 {
            let revenue_ledger_name = revenue_ledger(&wallet.currency);
            if let Err(err) = self.engine.create_ledger(&revenue_ledger_name).await {
                return Err(partial_commit(committed, err));
            }
            let spec = TransactionSpec::new(
                PostingSpec {
                    source: WORLD.to_string(),
                    destination: revenue_addr(),
                    asset: asset_str.to_string(),
                    amount: revenue,
                    source_overdraft: false,
                },
                reference,
            );
            let revenue_tx = match self
                .engine
                .create_transaction(&revenue_ledger_name, spec)
                .await
            {
                Ok(executed) => executed.transaction,
                Err(err) => return Err(partial_commit(committed, err)),
            };
            receipt.links.revenue_ledger = Some(revenue_ledger_name);
            receipt.links.revenue_tx_id = Some(revenue_tx.id);
        }

        Ok(())
    }

    /// Parse a wallet id and resolve its currency through the registry.
    pub(crate) fn resolve(&self, wallet_id: &str) -> WalletResult<(WalletId, String)> {
        let wallet = WalletId::parse(wallet_id)?;
        let record = self.registry.require(&wallet.currency)?;
        let asset = asset(&record.code, record.precision);
        Ok((wallet, asset))
    }

    fn check_wallet(
        &self,
        wallet: &WalletId,
        asset: &str,
        transaction: &Transaction,
    ) -> WalletResult<()> {
        let available = wallet.available_addr();
        let lien = wallet.lien_addr();
        guard::check_wallet_volumes(transaction, [available.as_str(), lien.as_str()], asset)
    }
}

fn partial_commit(committed: Vec<CommittedLeg>, cause: EngineError) -> WalletError {
    warn!(
        legs = committed.len(),
        %cause,
        "multi-ledger operation partially committed"
    );
    WalletError::PartialCommit {
        committed,
        cause: cause.to_string(),
    }
}
