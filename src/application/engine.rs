use super::context::LedgerContext;
use super::payments::PaymentOrchestrator;
use super::payouts::PayoutOrchestrator;
use super::reconcile::ReconciliationJob;
use super::release::BalanceReleaseJob;
use super::wallets::WalletQueries;
use super::webhooks::WebhookProcessor;
use crate::config::LedgerPolicy;
use crate::domain::clock::ClockHandle;
use crate::domain::gateway::GatewayHandle;
use crate::domain::ports::{CreatorDirectory, PackCatalog, PurchaseNotifier, StorageHandle};
use std::sync::Arc;

/// The services the ledger consumes but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn PackCatalog>,
    pub directory: Arc<dyn CreatorDirectory>,
    pub notifier: Arc<dyn PurchaseNotifier>,
}

/// The main entry point of the ledger.
///
/// `PaymentEngine` wires the orchestrators and jobs to one store, one gateway
/// and one set of wallet locks. Every trigger (HTTP request, webhook, CLI job)
/// goes through it, so concurrent triggers serialise on the same wallets.
#[derive(Clone)]
pub struct PaymentEngine {
    ctx: LedgerContext,
    payments: PaymentOrchestrator,
    payouts: PayoutOrchestrator,
    release: BalanceReleaseJob,
    reconciliation: ReconciliationJob,
    wallets: WalletQueries,
    webhooks: WebhookProcessor,
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for wallets, ledger, payments and payouts.
    /// * `gateway` - The payment processor adapter.
    /// * `clock` - Time source for expiry and holding periods.
    /// * `policy` - Fees, holding period, withdrawal minimum and retries.
    /// * `collaborators` - Pack catalog, creator directory and purchase notifier.
    pub fn new(
        store: StorageHandle,
        gateway: GatewayHandle,
        clock: ClockHandle,
        policy: LedgerPolicy,
        collaborators: Collaborators,
    ) -> Self {
        let ctx = LedgerContext::new(store, gateway, clock, policy);
        let payments = PaymentOrchestrator::new(
            ctx.clone(),
            collaborators.catalog,
            collaborators.notifier,
        );
        let payouts = PayoutOrchestrator::new(ctx.clone(), collaborators.directory.clone());
        Self {
            release: BalanceReleaseJob::new(ctx.clone()),
            reconciliation: ReconciliationJob::new(ctx.clone()),
            wallets: WalletQueries::new(ctx.clone(), collaborators.directory),
            webhooks: WebhookProcessor::new(ctx.clone(), payments.clone(), payouts.clone()),
            payments,
            payouts,
            ctx,
        }
    }

    pub fn payments(&self) -> &PaymentOrchestrator {
        &self.payments
    }

    pub fn payouts(&self) -> &PayoutOrchestrator {
        &self.payouts
    }

    pub fn release_job(&self) -> &BalanceReleaseJob {
        &self.release
    }

    pub fn reconciliation(&self) -> &ReconciliationJob {
        &self.reconciliation
    }

    pub fn wallets(&self) -> &WalletQueries {
        &self.wallets
    }

    pub fn webhooks(&self) -> &WebhookProcessor {
        &self.webhooks
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.ctx.policy
    }

    pub fn store(&self) -> &StorageHandle {
        &self.ctx.store
    }
}
