mod common;

use chrono::Duration;
use common::*;
use pixledger::application::payments::PaymentOutcome;
use pixledger::domain::ids::WalletId;
use pixledger::domain::ledger::{Category, Direction};
use pixledger::domain::payment::PaymentStatus;
use pixledger::domain::ports::Page;
use pixledger::error::LedgerError;

#[tokio::test]
async fn test_paid_sale_freezes_creator_earnings() {
    let h = Harness::new();
    let id = h.paid_sale(PACK).await;

    let payment = h.engine.payments().payment(id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.paid_at, Some(start()));
    assert_eq!(payment.available_at, Some(start() + Duration::days(14)));
    assert_eq!(payment.creator_earnings.value(), PACK_EARNINGS);
    assert_eq!(payment.platform_fee.value(), PACK_PRICE - PACK_EARNINGS);

    let summary = h.summary().await;
    assert_eq!(summary.available.value(), 0);
    assert_eq!(summary.frozen.value(), PACK_EARNINGS);

    let history = h
        .engine
        .wallets()
        .history(&h.creator(), Page::default())
        .await
        .unwrap();
    assert_eq!(history.total, 1);
    let sale = &history.entries[0];
    assert_eq!(sale.category, Category::Sale);
    assert_eq!(sale.direction, Direction::Credit);
    assert_eq!(sale.balance_after.value(), PACK_EARNINGS);
    assert_eq!(sale.metadata.get("pack_id").map(String::as_str), Some(PACK));
}

#[tokio::test]
async fn test_platform_fee_lands_in_platform_wallet() {
    let h = Harness::new();
    h.paid_sale(PACK).await;

    let platform = h
        .engine
        .wallets()
        .summary(&WalletId::platform())
        .await
        .unwrap();
    assert_eq!(platform.available.value(), PACK_PRICE - PACK_EARNINGS);
    assert!(h.engine.wallets().verify(&WalletId::platform()).await.unwrap().is_consistent());
    assert!(h.engine.wallets().verify(&h.creator()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_checkout_of_unknown_pack_is_rejected() {
    let h = Harness::new();
    let result = h.engine.payments().create_checkout(BUYER, "missing").await;
    assert!(matches!(result, Err(LedgerError::PackNotFound(_))));
}

#[tokio::test]
async fn test_checkout_during_gateway_outage_stores_nothing() {
    let h = Harness::new();
    h.gateway.set_available(false);

    let result = h.engine.payments().create_checkout(BUYER, PACK).await;
    assert!(matches!(result, Err(LedgerError::GatewayUnavailable(_))));
    let pending = h.engine.payments().poll_pending().await.unwrap();
    assert_eq!(pending.processed + pending.skipped, 0);
}

#[tokio::test]
async fn test_checkout_returns_qr_code_and_expiry() {
    let h = Harness::new();
    let checkout = h.engine.payments().create_checkout(BUYER, PACK).await.unwrap();

    assert_eq!(checkout.amount.value(), PACK_PRICE);
    assert_eq!(checkout.expires_at, start() + Duration::minutes(60));
    assert!(!checkout.qr_code.is_empty());
    assert!(!checkout.qr_code_text.is_empty());
}

#[tokio::test]
async fn test_unpaid_payment_expires_after_sixty_one_minutes() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;

    h.clock.advance(Duration::minutes(59));
    let status = h.engine.payments().payment_status(id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Pending);

    h.clock.advance(Duration::minutes(2));
    let status = h.engine.payments().payment_status(id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Expired);
    assert_eq!(status.paid_at, None);
    assert_eq!(h.summary().await.total.value(), 0);
}

#[tokio::test]
async fn test_expiry_still_applies_while_gateway_is_down() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;
    h.clock.advance(Duration::minutes(61));
    h.gateway.set_available(false);

    let status = h.engine.payments().payment_status(id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Expired);
}

#[tokio::test]
async fn test_expiry_sweep_closes_only_stale_payments() {
    let h = Harness::new();
    let stale = h.checkout(PACK).await;
    h.clock.advance(Duration::minutes(30));
    let fresh = h.checkout(PACK).await;
    h.clock.advance(Duration::minutes(31));

    let report = h.engine.payments().expire_stale().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.is_clean());

    let stale = h.engine.payments().payment(stale).await.unwrap();
    let fresh = h.engine.payments().payment(fresh).await.unwrap();
    assert_eq!(stale.status, PaymentStatus::Expired);
    assert_eq!(fresh.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_buyer_cannot_pay_an_expired_charge() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;
    h.clock.advance(Duration::minutes(61));

    let gateway_id = h.gateway_id(id).await;
    assert!(h.gateway.approve_charge(&gateway_id).await.is_err());
}

#[tokio::test]
async fn test_buyer_cancels_pending_payment() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;

    let view = h.engine.payments().cancel(id, BUYER).await.unwrap();
    assert_eq!(view.status, PaymentStatus::Cancelled);

    let again = h.engine.payments().cancel(id, BUYER).await;
    assert!(matches!(again, Err(LedgerError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_stranger_cannot_cancel() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;

    let result = h.engine.payments().cancel(id, "someone-else").await;
    assert!(matches!(result, Err(LedgerError::PaymentNotFound(_))));
}

#[tokio::test]
async fn test_payment_made_before_cancel_is_credited() {
    let h = Harness::new();
    let id = h.checkout(PACK).await;
    h.buyer_pays(id).await;

    let result = h.engine.payments().cancel(id, BUYER).await;
    assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));

    let payment = h.engine.payments().payment(id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(h.summary().await.frozen.value(), PACK_EARNINGS);
}

#[tokio::test]
async fn test_repeated_polls_post_the_sale_once() {
    let h = Harness::new();
    let id = h.paid_sale(PACK).await;

    let outcome = h.engine.payments().sync_payment(id).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Ignored);
    let report = h.engine.payments().poll_pending().await.unwrap();
    assert_eq!(report.processed, 0);

    assert_eq!(h.summary().await.frozen.value(), PACK_EARNINGS);
    let entries = h.engine.wallets().history(&h.creator(), Page::default()).await.unwrap();
    assert_eq!(entries.total, 1);
}

#[tokio::test]
async fn test_poll_picks_up_paid_charges() {
    let h = Harness::new();
    let paid = h.checkout(PACK).await;
    let unpaid = h.checkout(PACK).await;
    h.buyer_pays(paid).await;

    let report = h.engine.payments().poll_pending().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);

    let unpaid = h.engine.payments().payment(unpaid).await.unwrap();
    assert_eq!(unpaid.status, PaymentStatus::Pending);
}
