use super::context::LedgerContext;
use super::report::BatchReport;
use crate::domain::ids::PaymentId;
use crate::domain::ledger::{Category, Direction, EntryReference, LedgerEntry};
use crate::domain::money::Balance;
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::Commit;
use crate::error::{LedgerError, Result};

/// Moves sale proceeds from frozen to available once their holding period elapsed.
///
/// Safe to re-run or run concurrently: a payment with a RELEASE entry is skipped.
#[derive(Clone)]
pub struct BalanceReleaseJob {
    ctx: LedgerContext,
}

impl BalanceReleaseJob {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self) -> Result<BatchReport> {
        let mut report = BatchReport::new("release");
        let now = self.ctx.clock.now();
        let due: Vec<_> = self
            .ctx
            .store
            .payments_with_status(PaymentStatus::Paid)
            .await?
            .into_iter()
            .filter(|p| p.is_releasable(now))
            .collect();

        for payment in due {
            match self.release(payment.id).await {
                Ok(true) => report.processed(),
                Ok(false) => report.skipped(),
                Err(e) => report.failed(payment.id, &e),
            }
        }
        report.log_summary();
        Ok(report)
    }

    /// Releases one payment. `Ok(false)` means there was nothing to do.
    pub async fn release(&self, id: PaymentId) -> Result<bool> {
        let creator = self
            .ctx
            .store
            .payment(id)
            .await?
            .ok_or_else(|| LedgerError::PaymentNotFound(id.to_string()))?
            .creator_id;
        let _guard = self.ctx.locks.acquire(&creator).await;

        let mut payment = self
            .ctx
            .store
            .payment(id)
            .await?
            .ok_or_else(|| LedgerError::PaymentNotFound(id.to_string()))?;
        let now = self.ctx.clock.now();
        if !payment.is_releasable(now) {
            return Ok(false);
        }
        let reference = EntryReference::Payment(payment.id);
        if self.ctx.store.has_entry(&reference, Category::Release).await? {
            return Ok(false);
        }

        let amount = payment.creator_earnings;
        let mut wallet = self.ctx.wallet_or_new(&creator).await?;
        wallet.release(amount)?;
        wallet.touch(now);
        payment.mark_released(now);

        let total = wallet.total();
        let unfreeze = LedgerEntry::new(
            creator.clone(),
            Direction::Debit,
            Category::Release,
            amount,
            total - Balance::from(amount),
            "Holding period over: out of frozen",
            reference,
            now,
        );
        let make_available = LedgerEntry::new(
            creator.clone(),
            Direction::Credit,
            Category::Release,
            amount,
            total,
            "Holding period over: into available",
            reference,
            now,
        );
        let commit = Commit::new()
            .wallet(wallet)
            .entry(unfreeze)
            .entry(make_available)
            .payment(payment);

        match self.ctx.store.commit(commit).await {
            Ok(()) => {}
            Err(LedgerError::DuplicatePosting(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        tracing::info!(payment_id = %id, creator_id = %creator, %amount, "Earnings released");
        Ok(true)
    }
}
