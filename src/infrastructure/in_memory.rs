use crate::domain::ids::{EntryId, PaymentId, PayoutId, WalletId};
use crate::domain::ledger::{Category, EntryReference, LedgerEntry, PostingKey};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::payout::{Payout, PayoutStatus};
use crate::domain::ports::{
    Commit, LedgerStore, Page, PaymentStore, PayoutStore, Storage, WalletStore, WebhookLog,
};
use crate::domain::wallet::Wallet;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    wallets: HashMap<WalletId, Wallet>,
    entries: Vec<LedgerEntry>,
    entry_ids: HashSet<EntryId>,
    entries_by_wallet: HashMap<WalletId, Vec<usize>>,
    posting_keys: HashSet<PostingKey>,
    references: HashSet<(EntryReference, Category)>,
    payments: HashMap<PaymentId, Payment>,
    payment_by_gateway: HashMap<String, PaymentId>,
    payouts: HashMap<PayoutId, Payout>,
    payout_by_gateway: HashMap<String, PayoutId>,
    processed_events: HashSet<String>,
}

impl Inner {
    /// Rejects the commit before anything is written.
    fn validate(&self, commit: &Commit) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &commit.entries {
            let key = entry.posting_key();
            if self.posting_keys.contains(&key) || !seen.insert(key.clone()) {
                return Err(LedgerError::DuplicatePosting(key.to_string()));
            }
            if self.entry_ids.contains(&entry.id) {
                return Err(LedgerError::InvariantViolation(format!(
                    "Ledger entry {} already written",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, commit: Commit) {
        for wallet in commit.wallets {
            self.wallets.insert(wallet.owner_id.clone(), wallet);
        }
        for entry in commit.entries {
            self.posting_keys.insert(entry.posting_key());
            self.references.insert((entry.reference, entry.category));
            self.entry_ids.insert(entry.id);
            self.entries_by_wallet
                .entry(entry.wallet_id.clone())
                .or_default()
                .push(self.entries.len());
            self.entries.push(entry);
        }
        for payment in commit.payments {
            self.payment_by_gateway
                .insert(payment.gateway_id.clone(), payment.id);
            self.payments.insert(payment.id, payment);
        }
        for payout in commit.payouts {
            if let Some(gateway_id) = &payout.gateway_id {
                self.payout_by_gateway.insert(gateway_id.clone(), payout.id);
            }
            self.payouts.insert(payout.id, payout);
        }
        self.processed_events.extend(commit.processed_events);
    }

    fn wallet_entries(&self, wallet: &WalletId) -> impl DoubleEndedIterator<Item = &LedgerEntry> {
        self.entries_by_wallet
            .get(wallet)
            .into_iter()
            .flatten()
            .map(|&index| &self.entries[index])
    }
}

/// A thread-safe in-memory store for the whole ledger.
///
/// All collections sit behind one `RwLock`, so a commit is applied atomically.
/// Ideal for tests and for running against the simulated gateway.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        let inner = self.inner.read().await;
        Ok(inner.wallets.get(id).cloned())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let inner = self.inner.read().await;
        let mut wallets: Vec<Wallet> = inner.wallets.values().cloned().collect();
        wallets.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        Ok(wallets)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn entries(&self, wallet: &WalletId, page: Page) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .wallet_entries(wallet)
            .rev()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn entry_count(&self, wallet: &WalletId) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner.entries_by_wallet.get(wallet).map_or(0, Vec::len))
    }

    async fn all_entries(&self, wallet: &WalletId) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.wallet_entries(wallet).cloned().collect())
    }

    async fn has_entry(&self, reference: &EntryReference, category: Category) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.references.contains(&(*reference, category)))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner.payments.get(&id).cloned())
    }

    async fn payment_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payment_by_gateway
            .get(gateway_id)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn payments_for_creator(&self, creator: &WalletId) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| &p.creator_id == creator)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl PayoutStore for InMemoryStore {
    async fn payout(&self, id: PayoutId) -> Result<Option<Payout>> {
        let inner = self.inner.read().await;
        Ok(inner.payouts.get(&id).cloned())
    }

    async fn payout_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payout>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payout_by_gateway
            .get(gateway_id)
            .and_then(|id| inner.payouts.get(id))
            .cloned())
    }

    async fn payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let inner = self.inner.read().await;
        let mut payouts: Vec<Payout> = inner
            .payouts
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        payouts.sort_by_key(|p| p.requested_at);
        Ok(payouts)
    }

    async fn payouts_for_creator(&self, creator: &WalletId) -> Result<Vec<Payout>> {
        let inner = self.inner.read().await;
        let mut payouts: Vec<Payout> = inner
            .payouts
            .values()
            .filter(|p| &p.creator_id == creator)
            .cloned()
            .collect();
        payouts.sort_by_key(|p| p.requested_at);
        Ok(payouts)
    }
}

#[async_trait]
impl WebhookLog for InMemoryStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.processed_events.contains(event_id))
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn commit(&self, commit: Commit) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.validate(&commit)?;
        inner.apply(commit);
        Ok(())
    }
}
