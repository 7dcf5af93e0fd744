mod common;

use chrono::Duration;
use common::*;
use pixledger::config::LedgerPolicy;
use pixledger::domain::clock::Clock;
use pixledger::domain::fees::FeeSchedule;
use pixledger::domain::ledger::{Category, Direction};
use pixledger::domain::payout::PayoutStatus;
use pixledger::domain::ports::Page;
use pixledger::error::LedgerError;

fn fee_free() -> Harness {
    Harness::with_policy(LedgerPolicy {
        fees: FeeSchedule::free(),
        ..test_policy()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payouts_never_overdraw() {
    let h = fee_free();
    h.released_sale(BIG_PACK).await;
    assert_eq!(h.summary().await.available.value(), BIG_PACK_PRICE);

    let payouts = h.engine.payouts();
    let (first, second) = tokio::join!(
        payouts.request_payout(CREATOR_USER, 4000),
        payouts.request_payout(CREATOR_USER, 4000)
    );

    let results = [first, second];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(refused, 1);
    assert_eq!(h.summary().await.available.value(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payouts_from_spawned_tasks() {
    let h = fee_free();
    h.released_sale(BIG_PACK).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.payouts().request_payout(CREATOR_USER, 1500).await
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(h.summary().await.available.value(), BIG_PACK_PRICE - 3 * 1500);
    assert!(h.engine.wallets().verify(&h.creator()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_payout_amount_rules() {
    let h = Harness::new();
    h.released_sale(PACK).await;

    for amount in [0, -50, 999] {
        let result = h.engine.payouts().request_payout(CREATOR_USER, amount).await;
        assert!(
            matches!(result, Err(LedgerError::InvalidPayoutAmount(_))),
            "amount {amount} should be refused"
        );
    }
    let result = h.engine.payouts().request_payout(CREATOR_USER, 1000).await;
    assert!(result.is_ok());

    let result = h.engine.payouts().request_payout("nobody", 1000).await;
    assert!(matches!(result, Err(LedgerError::CreatorNotFound(_))));
}

#[tokio::test]
async fn test_payout_debits_available_immediately() {
    let h = Harness::new();
    h.released_sale(PACK).await;

    let receipt = h.engine.payouts().request_payout(CREATOR_USER, 2000).await.unwrap();
    assert_eq!(receipt.status, PayoutStatus::Processing);
    assert_eq!(receipt.estimated_completion_at, Some(h.clock.now() + Duration::minutes(5)));

    let summary = h.summary().await;
    assert_eq!(summary.available.value(), PACK_EARNINGS - 2000);

    let history = h
        .engine
        .wallets()
        .history(&h.creator(), Page::default())
        .await
        .unwrap();
    let newest = &history.entries[0];
    assert_eq!(newest.category, Category::Payout);
    assert_eq!(newest.direction, Direction::Debit);
    assert_eq!(newest.balance_after.value(), PACK_EARNINGS - 2000);
    assert_eq!(
        newest.metadata.get("payout_key").map(String::as_str),
        Some("mar************om")
    );
}

#[tokio::test]
async fn test_poll_completes_settled_payouts() {
    let h = Harness::new();
    h.released_sale(PACK).await;
    let receipt = h.engine.payouts().request_payout(CREATOR_USER, 2000).await.unwrap();

    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.processed, 0);

    h.clock.advance(Duration::minutes(5));
    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.processed, 1);

    let payout = h.engine.payouts().payout(receipt.payout_id).await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Completed);
    assert!(payout.completed_at.is_some());
    assert_eq!(h.summary().await.available.value(), PACK_EARNINGS - 2000);
}

#[tokio::test]
async fn test_failed_payout_is_reversed_by_poll() {
    let h = Harness::new();
    h.released_sale(PACK).await;
    let receipt = h.engine.payouts().request_payout(CREATOR_USER, 2000).await.unwrap();
    let gateway_id = h
        .engine
        .payouts()
        .payout(receipt.payout_id)
        .await
        .unwrap()
        .gateway_id
        .unwrap();
    h.gateway.fail_payout(&gateway_id, "account closed").await.unwrap();

    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(h.summary().await.available.value(), PACK_EARNINGS);

    let history = h
        .engine
        .wallets()
        .history(&h.creator(), Page::default())
        .await
        .unwrap();
    let reversal = &history.entries[0];
    assert_eq!(reversal.category, Category::Adjustment);
    assert_eq!(reversal.direction, Direction::Credit);
    assert_eq!(reversal.amount.value(), 2000);

    // Nothing left to poll, nothing reversed twice.
    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.processed + report.skipped, 0);
    assert_eq!(h.summary().await.available.value(), PACK_EARNINGS);
}

#[tokio::test]
async fn test_payout_survives_gateway_outage() {
    let h = Harness::new();
    h.released_sale(PACK).await;
    h.gateway.set_available(false);

    let receipt = h.engine.payouts().request_payout(CREATOR_USER, 2000).await.unwrap();
    assert_eq!(receipt.status, PayoutStatus::Pending);
    assert_eq!(h.summary().await.available.value(), PACK_EARNINGS - 2000);

    // Still unreachable: the payout stays pending instead of failing.
    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(report.is_clean());

    h.gateway.set_available(true);
    let report = h.engine.payouts().poll_open().await.unwrap();
    assert_eq!(report.processed, 1);
    let payout = h.engine.payouts().payout(receipt.payout_id).await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Processing);
    assert!(payout.gateway_id.is_some());
}

#[tokio::test]
async fn test_payout_view_masks_key_and_is_private() {
    let h = Harness::new();
    h.released_sale(PACK).await;
    let receipt = h.engine.payouts().request_payout(CREATOR_USER, 1200).await.unwrap();

    let view = h
        .engine
        .payouts()
        .payout_for_user(CREATOR_USER, receipt.payout_id)
        .await
        .unwrap();
    assert_eq!(view.amount.value(), 1200);
    assert!(!view.payout_key.contains("maria@example.com"));

    let other = h.engine.payouts().payout_for_user(BUYER, receipt.payout_id).await;
    assert!(matches!(other, Err(LedgerError::CreatorNotFound(_))));
}
