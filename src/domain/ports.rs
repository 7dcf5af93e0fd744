use super::ids::{PaymentId, PayoutId, WalletId};
use super::ledger::{Category, EntryReference, LedgerEntry};
use super::money::Amount;
use super::payment::{Payment, PaymentStatus};
use super::payout::{Payout, PayoutKey, PayoutStatus};
use super::wallet::Wallet;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn wallet(&self, id: &WalletId) -> Result<Option<Wallet>>;
    async fn wallets(&self) -> Result<Vec<Wallet>>;
}

/// Offset/limit window over a wallet's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 200;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// A page of the wallet's entries, newest first.
    async fn entries(&self, wallet: &WalletId, page: Page) -> Result<Vec<LedgerEntry>>;
    async fn entry_count(&self, wallet: &WalletId) -> Result<usize>;
    /// Every entry of the wallet in posting order.
    async fn all_entries(&self, wallet: &WalletId) -> Result<Vec<LedgerEntry>>;
    /// Whether any entry of `category` already references `reference`.
    async fn has_entry(&self, reference: &EntryReference, category: Category) -> Result<bool>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn payment_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payment>>;
    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>>;
    async fn payments_for_creator(&self, creator: &WalletId) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn payout(&self, id: PayoutId) -> Result<Option<Payout>>;
    async fn payout_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payout>>;
    async fn payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>>;
    async fn payouts_for_creator(&self, creator: &WalletId) -> Result<Vec<Payout>>;
}

#[async_trait]
pub trait WebhookLog: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
}

/// Everything one balance-affecting operation writes.
///
/// A store applies a commit entirely or not at all.
#[derive(Debug, Default, Clone)]
pub struct Commit {
    pub wallets: Vec<Wallet>,
    pub entries: Vec<LedgerEntry>,
    pub payments: Vec<Payment>,
    pub payouts: Vec<Payout>,
    pub processed_events: Vec<String>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet(mut self, wallet: Wallet) -> Self {
        self.wallets.push(wallet);
        self
    }

    pub fn entry(mut self, entry: LedgerEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn payment(mut self, payment: Payment) -> Self {
        self.payments.push(payment);
        self
    }

    pub fn payout(mut self, payout: Payout) -> Self {
        self.payouts.push(payout);
        self
    }

    pub fn processed_event(mut self, event_id: Option<&str>) -> Self {
        if let Some(id) = event_id {
            self.processed_events.push(id.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
            && self.entries.is_empty()
            && self.payments.is_empty()
            && self.payouts.is_empty()
            && self.processed_events.is_empty()
    }
}

/// Persistence of wallets, ledger, payments and payouts.
///
/// `commit` must be atomic and must reject any entry whose posting key already
/// exists with `LedgerError::DuplicatePosting`, leaving the store unchanged.
#[async_trait]
pub trait Storage: WalletStore + LedgerStore + PaymentStore + PayoutStore + WebhookLog {
    async fn commit(&self, commit: Commit) -> Result<()>;
}

pub type StorageHandle = Arc<dyn Storage>;

/// A pack offered for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackListing {
    pub pack_id: String,
    pub creator_id: WalletId,
    pub title: String,
    pub price: Amount,
}

/// Payout details of a creator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorProfile {
    pub creator_id: WalletId,
    pub payout_key: PayoutKey,
}

#[async_trait]
pub trait PackCatalog: Send + Sync {
    async fn pack(&self, pack_id: &str) -> Result<Option<PackListing>>;
}

#[async_trait]
pub trait CreatorDirectory: Send + Sync {
    /// Resolves a signed-in user to their creator account, if they have one.
    async fn creator_for_user(&self, user_id: &str) -> Result<Option<CreatorProfile>>;
}

#[async_trait]
pub trait PurchaseNotifier: Send + Sync {
    async fn purchase_succeeded(&self, payment: &Payment);
}
