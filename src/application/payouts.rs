use super::context::LedgerContext;
use super::payments::PaymentOutcome;
use super::report::BatchReport;
use crate::domain::gateway::{GatewayPayoutStatus, PayoutRequest, PayoutStatusReport};
use crate::domain::ids::PayoutId;
use crate::domain::ledger::{Category, Direction, EntryReference, LedgerEntry};
use crate::domain::money::Amount;
use crate::domain::payout::{Payout, PayoutStatus, PayoutView};
use crate::domain::ports::{Commit, CreatorDirectory};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Answer to a payout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutReceipt {
    pub payout_id: PayoutId,
    pub status: PayoutStatus,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<&Payout> for PayoutReceipt {
    fn from(payout: &Payout) -> Self {
        Self {
            payout_id: payout.id,
            status: payout.status,
            estimated_completion_at: payout.estimated_completion_at,
            failure_reason: payout.failure_reason.clone(),
        }
    }
}

/// Owns the payout state machine.
///
/// The amount leaves `available` when the payout is created, in the same commit,
/// and comes back through an ADJUSTMENT entry only if the payout fails.
#[derive(Clone)]
pub struct PayoutOrchestrator {
    ctx: LedgerContext,
    directory: Arc<dyn CreatorDirectory>,
}

impl PayoutOrchestrator {
    pub fn new(ctx: LedgerContext, directory: Arc<dyn CreatorDirectory>) -> Self {
        Self { ctx, directory }
    }

    async fn load(&self, id: PayoutId) -> Result<Payout> {
        self.ctx
            .store
            .payout(id)
            .await?
            .ok_or_else(|| LedgerError::PayoutNotFound(id.to_string()))
    }

    /// Validates and reserves a withdrawal for the creator behind `user_id`,
    /// then hands it to the gateway.
    pub async fn request_payout(&self, user_id: &str, amount: i64) -> Result<PayoutReceipt> {
        let profile = self
            .directory
            .creator_for_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::CreatorNotFound(user_id.to_string()))?;
        let amount = Amount::new(amount).map_err(|_| {
            LedgerError::InvalidPayoutAmount(format!("amount must be positive, got {amount}"))
        })?;
        let min = self.ctx.policy.min_withdrawal;
        if amount < min {
            return Err(LedgerError::InvalidPayoutAmount(format!(
                "minimum withdrawal is {min}, requested {amount}"
            )));
        }

        let payout = {
            let _guard = self.ctx.locks.acquire(&profile.creator_id).await;
            let now = self.ctx.clock.now();
            let mut wallet = self.ctx.wallet_or_new(&profile.creator_id).await?;
            wallet.reserve(amount)?;
            wallet.touch(now);

            let payout = Payout::new(profile.creator_id.clone(), amount, profile.payout_key, now);
            let entry = LedgerEntry::new(
                wallet.owner_id.clone(),
                Direction::Debit,
                Category::Payout,
                amount,
                wallet.total(),
                "Payout requested",
                EntryReference::Payout(payout.id),
                now,
            )
            .with_metadata("payout_key", payout.payout_key.masked());
            self.ctx
                .store
                .commit(Commit::new().wallet(wallet).entry(entry).payout(payout.clone()))
                .await?;
            payout
        };
        tracing::info!(
            payout_id = %payout.id,
            creator_id = %payout.creator_id,
            %amount,
            "Payout reserved"
        );

        let payout = self.submit(payout).await?;
        Ok(PayoutReceipt::from(&payout))
    }

    /// Sends a pending payout to the gateway. The payout id is the external id,
    /// so a resubmission after a lost response cannot pay twice.
    pub async fn submit(&self, payout: Payout) -> Result<Payout> {
        let request = PayoutRequest {
            payee_ref: payout.payout_key.clone(),
            amount: payout.amount,
            external_id: payout.id.to_string(),
        };
        let gateway = &self.ctx.gateway;
        let request = &request;
        let accepted = self
            .ctx
            .policy
            .retry
            .run("create_payout", move || gateway.create_payout(request.clone()))
            .await;

        match accepted {
            Ok(accepted) => {
                {
                    let _guard = self.ctx.locks.acquire(&payout.creator_id).await;
                    let mut current = self.load(payout.id).await?;
                    if current.status == PayoutStatus::Pending {
                        current.mark_processing(
                            accepted.gateway_id.clone(),
                            accepted.estimated_completion_at,
                        )?;
                        self.ctx
                            .store
                            .commit(Commit::new().payout(current))
                            .await?;
                        tracing::info!(payout_id = %payout.id, gateway_id = %accepted.gateway_id, "Payout accepted by gateway");
                    }
                }
                if matches!(
                    accepted.status,
                    GatewayPayoutStatus::Completed | GatewayPayoutStatus::Failed
                ) {
                    let report = PayoutStatusReport {
                        status: accepted.status,
                        completed_at: None,
                        failure_reason: None,
                    };
                    self.apply_payout_report(payout.id, &accepted.gateway_id, report, None)
                        .await?;
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(payout_id = %payout.id, error = %e, "Payout submission outcome unknown, left pending for the next poll");
            }
            Err(LedgerError::GatewayRejected(reason)) => {
                let _guard = self.ctx.locks.acquire(&payout.creator_id).await;
                let current = self.load(payout.id).await?;
                if current.status.is_open() {
                    self.fail_and_reverse(current, reason, None).await?;
                }
            }
            Err(e) => return Err(e),
        }
        self.load(payout.id).await
    }

    /// Applies a gateway observation (webhook or poll) to a payout.
    pub async fn apply_payout_report(
        &self,
        id: PayoutId,
        gateway_id: &str,
        report: PayoutStatusReport,
        event_id: Option<&str>,
    ) -> Result<PaymentOutcome> {
        let creator = self.load(id).await?.creator_id;
        let _guard = self.ctx.locks.acquire(&creator).await;
        let mut payout = self.load(id).await?;
        let now = self.ctx.clock.now();

        let outcome = match (report.status, payout.status) {
            (GatewayPayoutStatus::Pending, _) => PaymentOutcome::Ignored,
            (GatewayPayoutStatus::Processing, PayoutStatus::Pending) => {
                payout.mark_processing(gateway_id.to_string(), payout.estimated_completion_at)?;
                self.commit_payout(payout, event_id).await?;
                return Ok(PaymentOutcome::Applied);
            }
            (GatewayPayoutStatus::Processing, _) => PaymentOutcome::Ignored,
            (GatewayPayoutStatus::Completed, status) if status.is_open() => {
                if status == PayoutStatus::Pending {
                    payout.mark_processing(gateway_id.to_string(), None)?;
                }
                payout.mark_completed(report.completed_at.unwrap_or(now))?;
                self.commit_payout(payout, event_id).await?;
                return Ok(PaymentOutcome::Applied);
            }
            (GatewayPayoutStatus::Completed, PayoutStatus::Completed) => {
                PaymentOutcome::AlreadyApplied
            }
            (GatewayPayoutStatus::Failed, status) if status.is_open() => {
                let reason = report
                    .failure_reason
                    .unwrap_or_else(|| "rejected by gateway".to_string());
                if payout.gateway_id.is_none() {
                    payout.gateway_id = Some(gateway_id.to_string());
                }
                return self.fail_and_reverse(payout, reason, event_id).await;
            }
            (GatewayPayoutStatus::Failed, PayoutStatus::Failed) => PaymentOutcome::AlreadyApplied,
            (reported, status) => {
                tracing::warn!(
                    payout_id = %payout.id,
                    ?reported,
                    %status,
                    "Gateway report conflicts with settled payout, ignoring"
                );
                PaymentOutcome::Ignored
            }
        };
        self.ctx.mark_processed(event_id).await?;
        Ok(outcome)
    }

    async fn commit_payout(&self, payout: Payout, event_id: Option<&str>) -> Result<()> {
        tracing::info!(payout_id = %payout.id, status = %payout.status, "Payout transitioned");
        self.ctx
            .store
            .commit(Commit::new().payout(payout).processed_event(event_id))
            .await
    }

    /// open -> failed, crediting the reserved amount back. Caller holds the wallet lock.
    async fn fail_and_reverse(
        &self,
        mut payout: Payout,
        reason: String,
        event_id: Option<&str>,
    ) -> Result<PaymentOutcome> {
        let now = self.ctx.clock.now();
        payout.mark_failed(reason.clone())?;
        let reference = EntryReference::Payout(payout.id);
        let mut commit = Commit::new();

        if !self.ctx.store.has_entry(&reference, Category::Adjustment).await? {
            let mut wallet = self.ctx.wallet_or_new(&payout.creator_id).await?;
            wallet.credit_available(payout.amount);
            wallet.touch(now);
            let entry = LedgerEntry::new(
                wallet.owner_id.clone(),
                Direction::Credit,
                Category::Adjustment,
                payout.amount,
                wallet.total(),
                "Payout failed, reservation returned",
                reference,
                now,
            )
            .with_metadata("failure_reason", &reason);
            commit = commit.wallet(wallet).entry(entry);
        }
        commit = commit.payout(payout.clone()).processed_event(event_id);

        match self.ctx.store.commit(commit).await {
            Ok(()) => {}
            Err(LedgerError::DuplicatePosting(key)) => {
                tracing::warn!(payout_id = %payout.id, %key, "Payout reversal already posted");
                return Ok(PaymentOutcome::AlreadyApplied);
            }
            Err(e) => return Err(e),
        }
        tracing::warn!(payout_id = %payout.id, %reason, amount = %payout.amount, "Payout failed, funds returned to available");
        Ok(PaymentOutcome::Applied)
    }

    /// Brings one open payout up to date: resubmits it if the gateway never
    /// acknowledged it, polls it otherwise.
    pub async fn sync_payout(&self, id: PayoutId) -> Result<PaymentOutcome> {
        let payout = self.load(id).await?;
        if !payout.status.is_open() {
            return Ok(PaymentOutcome::Ignored);
        }
        let Some(gateway_id) = payout.gateway_id.clone() else {
            let submitted = self.submit(payout).await?;
            return Ok(if submitted.status == PayoutStatus::Pending {
                PaymentOutcome::Ignored
            } else {
                PaymentOutcome::Applied
            });
        };
        let report = self.ctx.gateway.payout_status(&gateway_id).await?;
        self.apply_payout_report(id, &gateway_id, report, None).await
    }

    /// Polls every open payout.
    pub async fn poll_open(&self) -> Result<BatchReport> {
        let mut report = BatchReport::new("poll_payouts");
        let mut open = self
            .ctx
            .store
            .payouts_with_status(PayoutStatus::Pending)
            .await?;
        open.extend(
            self.ctx
                .store
                .payouts_with_status(PayoutStatus::Processing)
                .await?,
        );
        for payout in open {
            match self.sync_payout(payout.id).await {
                Ok(PaymentOutcome::Applied) => report.processed(),
                Ok(_) => report.skipped(),
                Err(e) => report.failed(payout.id, &e),
            }
        }
        report.log_summary();
        Ok(report)
    }

    /// A payout of the creator behind `user_id`, with the payout key masked.
    pub async fn payout_for_user(&self, user_id: &str, id: PayoutId) -> Result<PayoutView> {
        let profile = self
            .directory
            .creator_for_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::CreatorNotFound(user_id.to_string()))?;
        let payout = self.load(id).await?;
        if payout.creator_id != profile.creator_id {
            return Err(LedgerError::PayoutNotFound(id.to_string()));
        }
        Ok(PayoutView::from(&payout))
    }

    pub async fn payout(&self, id: PayoutId) -> Result<Payout> {
        self.load(id).await
    }
}
