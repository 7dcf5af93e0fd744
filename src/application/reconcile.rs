use super::context::LedgerContext;
use super::report::BatchReport;
use crate::domain::ids::{ReconciliationRunId, WalletId};
use crate::domain::ledger::{Category, Direction, EntryReference, LedgerEntry, net_balance};
use crate::domain::money::Balance;
use crate::domain::payment::PaymentStatus;
use crate::domain::payout::PayoutStatus;
use crate::domain::ports::Commit;
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::collections::BTreeSet;

/// A wallet whose stored balances disagree with its payment and payout records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletCorrection {
    pub wallet_id: WalletId,
    pub stored_available: Balance,
    pub stored_frozen: Balance,
    pub expected_available: Balance,
    pub expected_frozen: Balance,
    /// Net amount of the ADJUSTMENT entry, zero when only the split changed.
    pub adjustment: Balance,
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: ReconciliationRunId,
    pub dry_run: bool,
    pub batch: BatchReport,
    pub corrections: Vec<WalletCorrection>,
}

/// Re-derives every creator wallet from its records and corrects the ones that drifted.
///
/// frozen = earnings of paid, unreleased payments.
/// available = earnings of paid, released payments minus payouts that are not failed.
/// A corrected wallet gets exactly one ADJUSTMENT entry for the net change of its
/// total, so the ledger still sums to the stored balances afterwards.
#[derive(Clone)]
pub struct ReconciliationJob {
    ctx: LedgerContext,
}

impl ReconciliationJob {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, dry_run: bool) -> Result<ReconciliationReport> {
        let run_id = ReconciliationRunId::new();
        let mut batch = BatchReport::new(if dry_run { "reconcile_dry_run" } else { "reconcile" });
        let mut corrections = Vec::new();

        let mut wallet_ids: BTreeSet<WalletId> = self
            .ctx
            .store
            .wallets()
            .await?
            .into_iter()
            .map(|w| w.owner_id)
            .collect();
        for status in [PaymentStatus::Paid, PaymentStatus::Refunded] {
            for payment in self.ctx.store.payments_with_status(status).await? {
                wallet_ids.insert(payment.creator_id);
            }
        }

        for wallet_id in wallet_ids {
            if wallet_id.is_platform() {
                continue;
            }
            match self.reconcile_wallet(&wallet_id, run_id, dry_run).await {
                Ok(Some(correction)) => {
                    batch.processed();
                    corrections.push(correction);
                }
                Ok(None) => batch.skipped(),
                Err(e) => batch.failed(&wallet_id, &e),
            }
        }
        batch.log_summary();
        Ok(ReconciliationReport {
            run_id,
            dry_run,
            batch,
            corrections,
        })
    }

    async fn reconcile_wallet(
        &self,
        wallet_id: &WalletId,
        run_id: ReconciliationRunId,
        dry_run: bool,
    ) -> Result<Option<WalletCorrection>> {
        let _guard = self.ctx.locks.acquire(wallet_id).await;
        let now = self.ctx.clock.now();

        let mut expected_frozen = Balance::ZERO;
        let mut expected_available = Balance::ZERO;
        for payment in self.ctx.store.payments_for_creator(wallet_id).await? {
            if payment.status != PaymentStatus::Paid {
                continue;
            }
            if payment.released_at.is_some() {
                expected_available += payment.creator_earnings;
            } else {
                expected_frozen += payment.creator_earnings;
            }
        }
        for payout in self.ctx.store.payouts_for_creator(wallet_id).await? {
            if payout.status != PayoutStatus::Failed {
                expected_available -= payout.amount;
            }
        }
        if expected_available.is_negative() {
            return Err(LedgerError::InvariantViolation(format!(
                "records of wallet {wallet_id} imply a negative available balance of {expected_available}"
            )));
        }

        let mut wallet = self.ctx.wallet_or_new(wallet_id).await?;
        let ledger_total = net_balance(&self.ctx.store.all_entries(wallet_id).await?);
        let expected_total = expected_available + expected_frozen;
        if wallet.available == expected_available
            && wallet.frozen == expected_frozen
            && ledger_total == expected_total
        {
            return Ok(None);
        }

        let adjustment = expected_total - ledger_total;
        let mut correction = WalletCorrection {
            wallet_id: wallet_id.clone(),
            stored_available: wallet.available,
            stored_frozen: wallet.frozen,
            expected_available,
            expected_frozen,
            adjustment,
            applied: false,
        };
        tracing::warn!(
            %wallet_id,
            stored_available = %wallet.available,
            stored_frozen = %wallet.frozen,
            %expected_available,
            %expected_frozen,
            %adjustment,
            dry_run,
            "Wallet out of line with its records"
        );
        if dry_run {
            return Ok(Some(correction));
        }

        wallet.available = expected_available;
        wallet.frozen = expected_frozen;
        wallet.touch(now);
        let mut commit = Commit::new();
        if let Some(amount) = adjustment.magnitude() {
            let direction = if adjustment.is_negative() {
                Direction::Debit
            } else {
                Direction::Credit
            };
            let entry = LedgerEntry::new(
                wallet_id.clone(),
                direction,
                Category::Adjustment,
                amount,
                wallet.total(),
                "Balance reconciliation",
                EntryReference::Reconciliation(run_id),
                now,
            )
            .with_metadata("previous_available", correction.stored_available)
            .with_metadata("previous_frozen", correction.stored_frozen);
            commit = commit.entry(entry);
        }
        self.ctx.store.commit(commit.wallet(wallet)).await?;
        correction.applied = true;
        Ok(Some(correction))
    }
}
