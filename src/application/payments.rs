use super::context::LedgerContext;
use super::report::BatchReport;
use crate::domain::gateway::{ChargeRequest, ChargeStatus, ChargeStatusReport};
use crate::domain::ids::{PaymentId, WalletId};
use crate::domain::ledger::{Category, Direction, EntryReference, LedgerEntry};
use crate::domain::money::Amount;
use crate::domain::payment::{NewPayment, Payment, PaymentStatus};
use crate::domain::ports::{Commit, PackCatalog, PurchaseNotifier};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// What applying a gateway observation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// State changed, postings written if any.
    Applied,
    /// The same observation was applied before.
    AlreadyApplied,
    /// Nothing to do: still pending, or stale for the payment's current state.
    Ignored,
}

/// Returned to the purchase flow after a charge is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub payment_id: PaymentId,
    pub qr_code: String,
    pub qr_code_text: String,
    pub expires_at: DateTime<Utc>,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatusView {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentStatusView {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status,
            paid_at: payment.paid_at,
        }
    }
}

/// Owns the payment state machine and the postings it triggers.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    ctx: LedgerContext,
    catalog: Arc<dyn PackCatalog>,
    notifier: Arc<dyn PurchaseNotifier>,
}

impl PaymentOrchestrator {
    pub fn new(
        ctx: LedgerContext,
        catalog: Arc<dyn PackCatalog>,
        notifier: Arc<dyn PurchaseNotifier>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            notifier,
        }
    }

    /// Creates a charge for `pack_id` and stores the pending payment.
    pub async fn create_checkout(&self, buyer_id: &str, pack_id: &str) -> Result<Checkout> {
        let pack = self
            .catalog
            .pack(pack_id)
            .await?
            .ok_or_else(|| LedgerError::PackNotFound(pack_id.to_string()))?;
        let split = self.ctx.policy.fees.split(pack.price)?;
        let payment_id = PaymentId::new();

        let request = ChargeRequest {
            buyer_ref: buyer_id.to_string(),
            amount: pack.price,
            external_id: payment_id.to_string(),
            expiry_minutes: self.ctx.policy.charge_expiry_minutes,
        };
        let gateway = &self.ctx.gateway;
        let request = &request;
        let charge = self
            .ctx
            .policy
            .retry
            .run("create_charge", move || gateway.create_charge(request.clone()))
            .await?;

        let payment = Payment::new(NewPayment {
            id: payment_id,
            buyer_id: buyer_id.to_string(),
            creator_id: pack.creator_id.clone(),
            pack_id: pack.pack_id.clone(),
            split,
            gateway_id: charge.gateway_id.clone(),
            qr_code: charge.qr_payload.clone(),
            qr_code_text: charge.qr_text.clone(),
            created_at: self.ctx.clock.now(),
            expires_at: charge.expires_at,
        });
        self.ctx
            .store
            .commit(Commit::new().payment(payment.clone()))
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            gateway_id = %payment.gateway_id,
            pack_id = %payment.pack_id,
            amount = %payment.gross_amount,
            "Checkout created"
        );
        Ok(Checkout {
            payment_id: payment.id,
            qr_code: payment.qr_code,
            qr_code_text: payment.qr_code_text,
            expires_at: payment.expires_at,
            amount: payment.gross_amount,
        })
    }

    async fn load(&self, id: PaymentId) -> Result<Payment> {
        self.ctx
            .store
            .payment(id)
            .await?
            .ok_or_else(|| LedgerError::PaymentNotFound(id.to_string()))
    }

    pub async fn payment(&self, id: PaymentId) -> Result<Payment> {
        self.load(id).await
    }

    /// Current status. A pending payment is first synchronised with the gateway;
    /// when the gateway cannot be reached the stored expiry still applies.
    pub async fn payment_status(&self, id: PaymentId) -> Result<PaymentStatusView> {
        self.sync_or_expire(id).await?;
        let payment = self.load(id).await?;
        Ok(PaymentStatusView::from(&payment))
    }

    async fn sync_or_expire(&self, id: PaymentId) -> Result<PaymentOutcome> {
        match self.sync_payment(id).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(payment_id = %id, error = %e, "Gateway unreachable, using stored state");
                self.apply_charge_report(id, ChargeStatusReport::pending(), None)
                    .await
            }
            other => other,
        }
    }

    /// Polls the gateway for a pending payment and applies what it reports.
    pub async fn sync_payment(&self, id: PaymentId) -> Result<PaymentOutcome> {
        let payment = self.load(id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(PaymentOutcome::Ignored);
        }
        let report = self.ctx.gateway.charge_status(&payment.gateway_id).await?;
        self.apply_charge_report(id, report, None).await
    }

    /// Applies a gateway observation (webhook or poll) to a payment.
    ///
    /// The paid transition posts the sale exactly once: a payment that is no
    /// longer pending, or that already has a SALE entry, is left alone.
    pub async fn apply_charge_report(
        &self,
        id: PaymentId,
        report: ChargeStatusReport,
        event_id: Option<&str>,
    ) -> Result<PaymentOutcome> {
        let creator = self.load(id).await?.creator_id;
        let platform = WalletId::platform();
        let _guard = self.ctx.locks.acquire_many(&[&creator, &platform]).await;

        // Re-read under the lock; the copy above may be stale.
        let mut payment = self.load(id).await?;
        let now = self.ctx.clock.now();

        let outcome = match report.status {
            ChargeStatus::Paid if payment.status == PaymentStatus::Pending => {
                return self.post_sale(payment, &report, event_id).await;
            }
            ChargeStatus::Paid => {
                if payment.paid_at.is_some() {
                    PaymentOutcome::AlreadyApplied
                } else {
                    tracing::warn!(
                        payment_id = %payment.id,
                        status = %payment.status,
                        "Paid event for a payment that is no longer pending, ignoring"
                    );
                    PaymentOutcome::Ignored
                }
            }
            ChargeStatus::Expired if payment.status == PaymentStatus::Pending => {
                payment.mark_expired()?;
                self.commit_transition(payment, event_id).await?;
                return Ok(PaymentOutcome::Applied);
            }
            ChargeStatus::Cancelled if payment.status == PaymentStatus::Pending => {
                payment.cancel(now)?;
                self.commit_transition(payment, event_id).await?;
                return Ok(PaymentOutcome::Applied);
            }
            ChargeStatus::Pending if payment.is_past_expiry(now) => {
                payment.mark_expired()?;
                self.commit_transition(payment, event_id).await?;
                return Ok(PaymentOutcome::Applied);
            }
            ChargeStatus::Expired | ChargeStatus::Cancelled => {
                if payment.status == PaymentStatus::Paid {
                    tracing::warn!(
                        payment_id = %payment.id,
                        reported = ?report.status,
                        "Gateway reports a paid charge as closed, ignoring"
                    );
                }
                PaymentOutcome::Ignored
            }
            ChargeStatus::Pending => PaymentOutcome::Ignored,
        };
        self.ctx.mark_processed(event_id).await?;
        Ok(outcome)
    }

    async fn commit_transition(&self, payment: Payment, event_id: Option<&str>) -> Result<()> {
        tracing::info!(payment_id = %payment.id, status = %payment.status, "Payment transitioned");
        self.ctx
            .store
            .commit(Commit::new().payment(payment).processed_event(event_id))
            .await
    }

    /// pending -> paid. Caller holds the creator and platform wallet locks.
    async fn post_sale(
        &self,
        mut payment: Payment,
        report: &ChargeStatusReport,
        event_id: Option<&str>,
    ) -> Result<PaymentOutcome> {
        let reference = EntryReference::Payment(payment.id);
        if self.ctx.store.has_entry(&reference, Category::Sale).await? {
            self.ctx.mark_processed(event_id).await?;
            return Ok(PaymentOutcome::AlreadyApplied);
        }
        if let Some(paid) = report.paid_amount
            && paid != payment.gross_amount
        {
            let error = LedgerError::InvariantViolation(format!(
                "payment {} charged {} but gateway reports {} paid",
                payment.id, payment.gross_amount, paid
            ));
            tracing::error!(payment_id = %payment.id, %error, "Refusing to post sale");
            return Err(error);
        }

        let now = self.ctx.clock.now();
        payment.mark_paid(now, self.ctx.policy.holding_period)?;

        let mut creator = self.ctx.wallet_or_new(&payment.creator_id).await?;
        creator.credit_frozen(payment.creator_earnings);
        creator.touch(now);
        let sale = LedgerEntry::new(
            creator.owner_id.clone(),
            Direction::Credit,
            Category::Sale,
            payment.creator_earnings,
            creator.total(),
            format!("Sale of pack {}", payment.pack_id),
            reference,
            now,
        )
        .with_metadata("pack_id", &payment.pack_id)
        .with_metadata("gross_amount", payment.gross_amount)
        .with_metadata("platform_fee", payment.platform_fee)
        .with_metadata("gateway_id", &payment.gateway_id);

        let mut commit = Commit::new().wallet(creator).entry(sale);
        if let Some(fee) = payment.platform_fee.magnitude() {
            let mut platform = self.ctx.wallet_or_new(&WalletId::platform()).await?;
            platform.credit_available(fee);
            platform.touch(now);
            let fee_entry = LedgerEntry::new(
                platform.owner_id.clone(),
                Direction::Credit,
                Category::PlatformFee,
                fee,
                platform.total(),
                format!("Fees on payment {}", payment.id),
                reference,
                now,
            )
            .with_metadata("creator_id", &payment.creator_id);
            commit = commit.wallet(platform).entry(fee_entry);
        }
        commit = commit.payment(payment.clone()).processed_event(event_id);

        match self.ctx.store.commit(commit).await {
            Ok(()) => {}
            Err(LedgerError::DuplicatePosting(key)) => {
                tracing::warn!(payment_id = %payment.id, %key, "Sale already posted");
                return Ok(PaymentOutcome::AlreadyApplied);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            payment_id = %payment.id,
            creator_id = %payment.creator_id,
            earnings = %payment.creator_earnings,
            available_at = ?payment.available_at,
            "Payment paid, earnings frozen"
        );
        self.notifier.purchase_succeeded(&payment).await;
        Ok(PaymentOutcome::Applied)
    }

    /// pending -> cancelled, on behalf of the buyer or the creator.
    pub async fn cancel(&self, id: PaymentId, requester: &str) -> Result<PaymentStatusView> {
        let payment = self.load(id).await?;
        if payment.buyer_id != requester && payment.creator_id.as_str() != requester {
            return Err(LedgerError::PaymentNotFound(id.to_string()));
        }

        // A buyer may have paid already; that must win over the cancellation.
        if payment.status == PaymentStatus::Pending {
            let report = self.ctx.gateway.charge_status(&payment.gateway_id).await?;
            if report.status != ChargeStatus::Pending {
                self.apply_charge_report(id, report, None).await?;
            }
        }

        let _guard = self.ctx.locks.acquire(&payment.creator_id).await;
        let mut payment = self.load(id).await?;
        payment.cancel(self.ctx.clock.now())?;
        self.commit_transition(payment.clone(), None).await?;
        Ok(PaymentStatusView::from(&payment))
    }

    /// paid -> refunded. Takes the earnings back out of the bucket they sit in.
    pub async fn refund(&self, id: PaymentId) -> Result<PaymentStatusView> {
        let creator = self.load(id).await?.creator_id;
        let _guard = self.ctx.locks.acquire(&creator).await;

        let mut payment = self.load(id).await?;
        let now = self.ctx.clock.now();
        if payment.status != PaymentStatus::Paid {
            return Err(LedgerError::InvalidTransition {
                from: payment.status.to_string(),
                to: PaymentStatus::Refunded.to_string(),
            });
        }
        let reference = EntryReference::Payment(payment.id);
        if self.ctx.store.has_entry(&reference, Category::Refund).await? {
            return Err(LedgerError::InvariantViolation(format!(
                "payment {} is paid but already has a refund posted",
                payment.id
            )));
        }

        let mut wallet = self.ctx.wallet_or_new(&creator).await?;
        let amount = payment.creator_earnings;
        let released = payment.released_at.is_some();
        let debited = if released {
            wallet.debit_available(amount)
        } else {
            wallet.debit_frozen(amount)
        };
        if !debited {
            let error = LedgerError::InsufficientFundsForRefund {
                payment: payment.id.to_string(),
                required: amount.value(),
                available: wallet.available.value(),
                frozen: wallet.frozen.value(),
            };
            tracing::error!(payment_id = %payment.id, %error, "Refund needs operator attention");
            return Err(error);
        }
        wallet.touch(now);
        payment.mark_refunded(now)?;

        let entry = LedgerEntry::new(
            creator.clone(),
            Direction::Debit,
            Category::Refund,
            amount,
            wallet.total(),
            format!("Refund of payment {}", payment.id),
            reference,
            now,
        )
        .with_metadata("source", if released { "available" } else { "frozen" });
        self.ctx
            .store
            .commit(Commit::new().wallet(wallet).entry(entry).payment(payment.clone()))
            .await?;

        tracing::info!(payment_id = %payment.id, %amount, "Payment refunded");
        Ok(PaymentStatusView::from(&payment))
    }

    /// Polls every pending payment.
    pub async fn poll_pending(&self) -> Result<BatchReport> {
        let mut report = BatchReport::new("poll_payments");
        for payment in self
            .ctx
            .store
            .payments_with_status(PaymentStatus::Pending)
            .await?
        {
            match self.sync_payment(payment.id).await {
                Ok(PaymentOutcome::Applied) => report.processed(),
                Ok(_) => report.skipped(),
                Err(e) => report.failed(payment.id, &e),
            }
        }
        report.log_summary();
        Ok(report)
    }

    /// Closes pending payments whose expiry passed. Each is checked with the
    /// gateway first so a late payment is still credited; an unreachable
    /// gateway does not keep a stale payment open.
    pub async fn expire_stale(&self) -> Result<BatchReport> {
        let mut report = BatchReport::new("expire_payments");
        let now = self.ctx.clock.now();
        for payment in self
            .ctx
            .store
            .payments_with_status(PaymentStatus::Pending)
            .await?
        {
            if !payment.is_past_expiry(now) {
                continue;
            }
            match self.sync_or_expire(payment.id).await {
                Ok(PaymentOutcome::Applied) => report.processed(),
                Ok(_) => report.skipped(),
                Err(e) => report.failed(payment.id, &e),
            }
        }
        report.log_summary();
        Ok(report)
    }
}
