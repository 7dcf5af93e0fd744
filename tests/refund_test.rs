mod common;

use common::*;
use pixledger::domain::ledger::{Category, Direction};
use pixledger::domain::payment::PaymentStatus;
use pixledger::domain::ports::Page;
use pixledger::error::LedgerError;

#[tokio::test]
async fn test_refund_takes_back_frozen_earnings() {
    let h = Harness::new();
    let id = h.paid_sale(PACK).await;

    let view = h.engine.payments().refund(id).await.unwrap();
    assert_eq!(view.status, PaymentStatus::Refunded);

    let summary = h.summary().await;
    assert_eq!(summary.frozen.value(), 0);
    assert_eq!(summary.total.value(), 0);

    let history = h
        .engine
        .wallets()
        .history(&h.creator(), Page::default())
        .await
        .unwrap();
    let refund = &history.entries[0];
    assert_eq!(refund.category, Category::Refund);
    assert_eq!(refund.direction, Direction::Debit);
    assert_eq!(refund.amount.value(), PACK_EARNINGS);
    assert_eq!(refund.metadata.get("source").map(String::as_str), Some("frozen"));
    assert!(h.engine.wallets().verify(&h.creator()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_refunded_sale_is_never_released() {
    let h = Harness::new();
    let id = h.paid_sale(PACK).await;
    h.engine.payments().refund(id).await.unwrap();

    h.clock.advance(chrono::Duration::days(15));
    let report = h.engine.release_job().run().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(h.summary().await.total.value(), 0);
}

#[tokio::test]
async fn test_refund_after_release_draws_from_available() {
    let h = Harness::new();
    let id = h.released_sale(PACK).await;

    h.engine.payments().refund(id).await.unwrap();
    assert_eq!(h.summary().await.available.value(), 0);
}

#[tokio::test]
async fn test_refund_larger_than_wallet_changes_nothing() {
    let h = Harness::new();
    let id = h.released_sale(PACK).await;
    h.engine.payouts().request_payout(CREATOR_USER, 2000).await.unwrap();
    let before = h.summary().await;

    let result = h.engine.payments().refund(id).await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientFundsForRefund { required, .. }) if required == PACK_EARNINGS
    ));

    assert_eq!(h.summary().await, before);
    let payment = h.engine.payments().payment(id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_only_paid_payments_can_be_refunded() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;
    let result = h.engine.payments().refund(id).await;
    assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));

    let id = h.paid_sale(PACK).await;
    h.engine.payments().refund(id).await.unwrap();
    let again = h.engine.payments().refund(id).await;
    assert!(matches!(again, Err(LedgerError::InvalidTransition { .. })));
}
