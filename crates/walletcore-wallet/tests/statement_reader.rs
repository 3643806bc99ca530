//! Statement and history projection scenarios

use std::collections::BTreeMap;
use std::sync::Arc;

use walletcore_engine::MemoryLedgerEngine;
use walletcore_types::CurrencyRegistry;
use walletcore_wallet::{
    ChannelLeg, CreditWallet, DebitWallet, LienWallet, OperationType, ReadFilter, ReleaseLien,
    ReleaseMode, WalletService,
};

const LEDGER: &str = "main";

fn harness() -> WalletService {
    WalletService::new(
        Arc::new(MemoryLedgerEngine::new()),
        Arc::new(CurrencyRegistry::builtin()),
    )
}

async fn seed_basic(service: &WalletService, wallet_id: &str) {
    service
        .credit(
            LEDGER,
            CreditWallet {
                wallet_id: wallet_id.to_string(),
                amount: 100,
                reference: "c1".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    service
        .debit(
            LEDGER,
            DebitWallet {
                wallet_id: wallet_id.to_string(),
                amount: 30,
                reference: "d1".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
                channel: None,
            },
        )
        .await
        .unwrap();
    service
        .lien(
            LEDGER,
            LienWallet {
                wallet_id: wallet_id.to_string(),
                amount: 20,
                reference: "l1".to_string(),
                idempotency_key: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn statement_ascending_order_and_balances() {
    let service = harness();
    seed_basic(&service, "u2-USD").await;

    let page = service
        .wallet_statement(LEDGER, "u2-USD", ReadFilter::default())
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 3);
    assert!(!page.has_more);

    let ops: Vec<OperationType> = page.entries.iter().map(|e| e.operation_type).collect();
    assert_eq!(
        ops,
        vec![OperationType::Credit, OperationType::Debit, OperationType::Lien]
    );

    let balance_after: Vec<i64> = page
        .entries
        .iter()
        .map(|e| e.balance_after.unwrap())
        .collect();
    assert_eq!(balance_after, vec![100, 70, 50]);

    let lien_after: Vec<i64> = page.entries.iter().map(|e| e.lien_after.unwrap()).collect();
    assert_eq!(lien_after, vec![0, 0, 20]);

    let balance_before: Vec<i64> = page
        .entries
        .iter()
        .map(|e| e.balance_before.unwrap())
        .collect();
    assert_eq!(balance_before, vec![0, 100, 70]);

    // entries ascend by transaction id
    let ids: Vec<u64> = page.entries.iter().map(|e| e.ledger_tx_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn statement_is_reproducible() {
    let service = harness();
    seed_basic(&service, "u2-USD").await;

    let first = service
        .wallet_statement(LEDGER, "u2-USD", ReadFilter::default())
        .await
        .unwrap();
    let second = service
        .wallet_statement(LEDGER, "u2-USD", ReadFilter::default())
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn history_descends_and_derives_balances_per_transaction() {
    let service = harness();
    seed_basic(&service, "u2-USD").await;

    let page = service
        .wallet_history(LEDGER, "u2-USD", ReadFilter::default())
        .await
        .unwrap();

    let ops: Vec<OperationType> = page.entries.iter().map(|e| e.operation_type).collect();
    assert_eq!(
        ops,
        vec![OperationType::Lien, OperationType::Debit, OperationType::Credit]
    );

    // the lien entry derives both account balances from its own volumes
    let lien_entry = &page.entries[0];
    assert_eq!(lien_entry.balance_after, Some(50));
    assert_eq!(lien_entry.balance_before, Some(70));
    assert_eq!(lien_entry.lien_after, Some(20));
    assert_eq!(lien_entry.lien_before, Some(0));

    // a pure credit never touched the lien account
    let credit_entry = &page.entries[2];
    assert_eq!(credit_entry.balance_after, Some(100));
    assert_eq!(credit_entry.lien_after, None);
}

#[tokio::test]
async fn statement_pagination_carries_running_balances() {
    let service = harness();
    for i in 0..7 {
        service
            .credit(
                LEDGER,
                CreditWallet {
                    wallet_id: "u3-USD".to_string(),
                    amount: 10,
                    reference: format!("c{i}"),
                    idempotency_key: None,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
    }

    let mut filter = ReadFilter {
        page_size: Some(3),
        ..ReadFilter::default()
    };

    let mut seen_ids = Vec::new();
    let mut last_balance = 0;
    loop {
        let page = service
            .wallet_statement(LEDGER, "u3-USD", filter.clone())
            .await
            .unwrap();
        for entry in &page.entries {
            assert_eq!(entry.balance_before, Some(last_balance));
            last_balance = entry.balance_after.unwrap();
            seen_ids.push(entry.ledger_tx_id);
        }
        match page.next_cursor {
            Some(cursor) => filter.cursor = Some(cursor),
            None => break,
        }
    }

    // no duplicates, no gaps, all seven seen, balances compose to the total
    let mut deduped = seen_ids.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), 7);
    assert_eq!(seen_ids, deduped);
    assert_eq!(last_balance, 70);
}

#[tokio::test]
async fn history_pagination_stable_under_new_writes() {
    let service = harness();
    for i in 0..5 {
        service
            .credit(
                LEDGER,
                CreditWallet {
                    wallet_id: "u4-USD".to_string(),
                    amount: 10,
                    reference: format!("c{i}"),
                    idempotency_key: None,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
    }

    let first_page = service
        .wallet_history(
            LEDGER,
            "u4-USD",
            ReadFilter {
                page_size: Some(2),
                ..ReadFilter::default()
            },
        )
        .await
        .unwrap();
    let first_ids: Vec<u64> = first_page.entries.iter().map(|e| e.ledger_tx_id).collect();

    // a write lands mid-pagination
    service
        .credit(
            LEDGER,
            CreditWallet {
                wallet_id: "u4-USD".to_string(),
                amount: 10,
                reference: "late".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
            },
        )
        .await
        .unwrap();

    let second_page = service
        .wallet_history(
            LEDGER,
            "u4-USD",
            ReadFilter {
                page_size: Some(2),
                cursor: first_page.next_cursor.clone(),
                ..ReadFilter::default()
            },
        )
        .await
        .unwrap();

    // descending pages keyed on the last-seen id never repeat or skip
    for entry in &second_page.entries {
        assert!(entry.ledger_tx_id < *first_ids.last().unwrap());
    }
}

#[tokio::test]
async fn reference_filter_narrows_the_view() {
    let service = harness();
    seed_basic(&service, "u2-USD").await;

    let page = service
        .wallet_statement(
            LEDGER,
            "u2-USD",
            ReadFilter {
                reference: Some("d1".to_string()),
                ..ReadFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].operation_type, OperationType::Debit);
}

#[tokio::test]
async fn release_modes_classify_distinctly() {
    let service = harness();
    service
        .credit(
            LEDGER,
            CreditWallet {
                wallet_id: "u5-USD".to_string(),
                amount: 100,
                reference: "c1".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    service
        .lien(
            LEDGER,
            LienWallet {
                wallet_id: "u5-USD".to_string(),
                amount: 60,
                reference: "l1".to_string(),
                idempotency_key: None,
            },
        )
        .await
        .unwrap();
    service
        .release_lien(
            LEDGER,
            ReleaseLien {
                wallet_id: "u5-USD".to_string(),
                amount: 20,
                reference: "rel-1".to_string(),
                mode: ReleaseMode::ReleaseOnly,
                idempotency_key: None,
                channel: None,
            },
        )
        .await
        .unwrap();
    service
        .release_lien(
            LEDGER,
            ReleaseLien {
                wallet_id: "u5-USD".to_string(),
                amount: 40,
                reference: "pay-1".to_string(),
                mode: ReleaseMode::Pay,
                idempotency_key: None,
                channel: None,
            },
        )
        .await
        .unwrap();

    let page = service
        .wallet_statement(LEDGER, "u5-USD", ReadFilter::default())
        .await
        .unwrap();
    let ops: Vec<OperationType> = page.entries.iter().map(|e| e.operation_type).collect();
    assert_eq!(
        ops,
        vec![
            OperationType::Credit,
            OperationType::Lien,
            OperationType::ReleaseOnly,
            OperationType::ReleaseAndDebit,
        ]
    );

    // the pay release reduces lien without touching available
    let pay = &page.entries[3];
    assert_eq!(pay.balance_before, Some(60));
    assert_eq!(pay.balance_after, Some(60));
    assert_eq!(pay.lien_before, Some(40));
    assert_eq!(pay.lien_after, Some(0));
}

#[tokio::test]
async fn channel_history_lists_channel_movements() {
    let service = harness();
    service
        .credit(
            LEDGER,
            CreditWallet {
                wallet_id: "u6-USD".to_string(),
                amount: 500,
                reference: "c1".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    let channel = service
        .create_channel("USD", BTreeMap::new())
        .await
        .unwrap();
    service
        .credit_channel(&channel.channel_id, "USD", 200, "cc1")
        .await
        .unwrap();
    service
        .debit(
            LEDGER,
            DebitWallet {
                wallet_id: "u6-USD".to_string(),
                amount: 100,
                reference: "d1".to_string(),
                idempotency_key: None,
                metadata: BTreeMap::new(),
                channel: Some(ChannelLeg {
                    channel_id: channel.channel_id.clone(),
                    amount: 100,
                }),
            },
        )
        .await
        .unwrap();

    let page = service
        .channel_history(&channel.channel_id, "USD", ReadFilter::default())
        .await
        .unwrap();

    // newest first: the settlement debit, then the funding credit
    assert_eq!(page.transactions.len(), 2);
    assert_eq!(page.transactions[0].reference, "d1");
    assert_eq!(page.transactions[1].reference, "cc1");
}

#[tokio::test]
async fn unknown_ledger_read_is_not_found() {
    let service = harness();
    let err = service
        .wallet_history("ghost", "u1-USD", ReadFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
